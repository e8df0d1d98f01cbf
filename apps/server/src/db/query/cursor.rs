//! Opaque keyset pagination tokens.
//!
//! A token is the base64url encoding of a JSON object holding the last row's
//! value for each sort field. Key order inside the token is not authoritative;
//! readers walk the sort spec instead.

use super::sort::SortSpec;
use crate::db::traits::Row;
use crate::{Error, Result};
use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde_json::{Map, Value as JsonValue};

pub type CursorValues = Map<String, JsonValue>;

/// Whether a value counts as present for cursor purposes.
///
/// Null, `false`, zero, empty strings and empty containers are not.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// Encode the resume point after `last_row`.
pub fn encode(last_row: &Row, sort: &SortSpec) -> String {
    let mut values = CursorValues::new();
    for field in sort.fields() {
        if let Some(value) = last_row.get(field).filter(|v| is_truthy(v)) {
            values.insert(field.to_string(), value.clone());
        }
    }
    // Serializing a map of JSON values cannot fail.
    let json = serde_json::to_vec(&values).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Next-page token for a fetched page.
///
/// Empty when the limit is unset or the page came back short.
pub fn next_token(rows: &[Row], limit: Option<u64>, sort: &SortSpec) -> String {
    match (limit, rows.last()) {
        (Some(limit), Some(last)) if limit > 0 && rows.len() as u64 >= limit => {
            encode(last, sort)
        }
        _ => String::new(),
    }
}

pub fn decode(token: &str) -> Result<CursorValues> {
    let trimmed = token.trim();
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(trimmed))
        .map_err(|e| Error::MalformedCursor(format!("invalid base64: {e}")))?;

    match serde_json::from_slice::<JsonValue>(&bytes) {
        Ok(JsonValue::Object(values)) => Ok(values),
        Ok(_) => Err(Error::MalformedCursor(
            "cursor does not hold an object".to_string(),
        )),
        Err(e) => Err(Error::MalformedCursor(format!("invalid JSON: {e}"))),
    }
}
