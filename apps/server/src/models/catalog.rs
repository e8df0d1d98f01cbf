//! Typed bodies for creating sites, stations and EVSEs.
//!
//! Request bodies arrive as loose JSON objects. They are decoded into these
//! structs, validated, and serialized back into the column map that is
//! inserted, so unknown keys never reach the database.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::db::query::cursor::is_truthy;
use crate::db::Row;
use crate::{Error, Result};

/// A validated insert body.
pub trait NewRecord: DeserializeOwned + Serialize + Validate {
    /// Human label used in error messages ("Site", "Station", "Evse").
    const LABEL: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewSite {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "required_id"))]
    pub owner_id: JsonValue,
    #[validate(range(min = -90.0, max = 90.0, message = "latitude must be within [-90, 90]"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "longitude must be within [-180, 180]"))]
    pub longitude: f64,
    #[validate(length(min = 1, message = "street_address is required"))]
    pub street_address: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "zip_code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

impl NewRecord for NewSite {
    const LABEL: &'static str = "Site";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewStation {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(range(min = 1, message = "site_id is required"))]
    pub site_id: i64,
    #[validate(range(min = -90.0, max = 90.0, message = "latitude must be within [-90, 90]"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "longitude must be within [-180, 180]"))]
    pub longitude: f64,
}

impl NewRecord for NewStation {
    const LABEL: &'static str = "Station";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewEvse {
    /// Taken from the request path, never from the body.
    pub station_id: i64,
    #[validate(range(min = 1, message = "evse_id is required"))]
    pub evse_id: i64,
    #[validate(length(min = 1, message = "connector_type is required"))]
    pub connector_type: String,
    #[validate(range(min = 1, message = "charge_level is required"))]
    pub charge_level: i64,
    #[validate(range(min = 0.0, message = "price must not be negative"))]
    pub price: f64,
}

impl NewRecord for NewEvse {
    const LABEL: &'static str = "Evse";
}

fn required_id(value: &JsonValue) -> std::result::Result<(), ValidationError> {
    if is_truthy(value) && (value.is_number() || value.is_string()) {
        return Ok(());
    }
    let mut err = ValidationError::new("required");
    err.message = Some(Cow::from("owner_id is required"));
    Err(err)
}

/// Decode and validate an insert body.
pub fn parse_new<T: NewRecord>(body: Row) -> Result<T> {
    let record: T = serde_json::from_value(JsonValue::Object(body))
        .map_err(|e| Error::Validation(describe_decode_error(&e)))?;
    record
        .validate()
        .map_err(|e| Error::Validation(describe_validation_errors(&e)))?;
    Ok(record)
}

/// Column map for inserting a validated record.
pub fn to_row<T: Serialize>(record: &T) -> Result<Row> {
    match serde_json::to_value(record) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(Error::Internal("record did not serialize to an object".into())),
        Err(e) => Err(Error::Internal(format!("record serialization failed: {e}"))),
    }
}

fn describe_decode_error(err: &serde_json::Error) -> String {
    let text = err.to_string();
    // serde reports "missing field `name` at line 1 column 2"
    if let Some(rest) = text.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return format!("{field} is required");
        }
    }
    text
}

fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}
