use super::BindValue;
use serde_json::Value as JsonValue;

/// Record a bound value and return its placeholder.
pub(super) fn push_bind(binds: &mut Vec<BindValue>, value: BindValue) -> &'static str {
    binds.push(value);
    "?"
}

pub(super) fn push_float(binds: &mut Vec<BindValue>, value: f64) -> &'static str {
    push_bind(binds, BindValue::Float(value))
}

impl BindValue {
    /// Convert a decoded cursor value into a bind parameter.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) => Self::Text(s.clone()),
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::Null => Self::Null,
            other => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Int(i) => JsonValue::from(*i),
            Self::UInt(u) => JsonValue::from(*u),
            Self::Float(f) => JsonValue::from(*f),
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Null => JsonValue::Null,
        }
    }
}
