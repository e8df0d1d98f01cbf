//! Full-text search term compilation.
//!
//! Free text is reduced to letters, digits and whitespace and rewritten as a
//! boolean-mode prefix query: `Palo Alto Station` becomes
//! `Palo* +Alto* +Station*`. The result is always bound as a parameter.

use super::schema::Columns;
use super::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    fields: Vec<String>,
    term: String,
}

impl SearchSpec {
    /// Build a search over the table's full-text columns.
    ///
    /// Returns `None` when the phrase has no searchable words or the table
    /// has no full-text columns present in its schema.
    pub fn build(phrase: Option<&str>, table: Table, columns: &Columns) -> Option<Self> {
        let term = boolean_query(phrase?)?;
        let fields: Vec<String> = table
            .search_fields()
            .iter()
            .filter(|f| columns.contains(f))
            .map(|f| f.to_string())
            .collect();
        if fields.is_empty() {
            return None;
        }
        Some(Self { fields, term })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn term(&self) -> &str {
        &self.term
    }
}

pub fn boolean_query(phrase: &str) -> Option<String> {
    let cleaned: String = phrase
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let words: Vec<String> = cleaned
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                format!("{word}*")
            } else {
                format!("+{word}*")
            }
        })
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
