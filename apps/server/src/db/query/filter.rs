//! Equality filters restricted to known columns.

use super::query_builder::BindValue;
use super::schema::Columns;

/// Validated `column = value` filters, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    fields: Vec<(String, BindValue)>,
}

impl FilterSpec {
    /// Keep candidates whose key is a column of the table and whose value is
    /// non-empty. Unknown keys are dropped, not rejected; a repeated key keeps
    /// its first value.
    pub fn build(candidates: &[(String, String)], columns: &Columns) -> Self {
        let mut fields: Vec<(String, BindValue)> = Vec::new();
        for (key, value) in candidates {
            if value.is_empty() || !columns.contains(key) {
                continue;
            }
            if fields.iter().any(|(existing, _)| existing == key) {
                continue;
            }
            fields.push((key.clone(), BindValue::Text(value.clone())));
        }
        Self { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, field: &str) -> Option<&BindValue> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Mandatory equality restriction applied by the caller (e.g. owner scoping).
///
/// Unlike request filters, a scope on a column the table lacks must not be
/// dropped: the assembler turns it into an always-false predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub column: String,
    pub value: BindValue,
}

impl Scope {
    pub fn new(column: impl Into<String>, value: BindValue) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}
