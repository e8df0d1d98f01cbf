//! Sort specification parsing.
//!
//! Every parsed spec ends with `created_at` and `id` so that the order is
//! total and keyset continuation never skips or repeats a row.

use std::fmt;

/// Tiebreakers appended to every sort, in order.
pub const TIEBREAKERS: [&str; 2] = ["created_at", "id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Comparison that selects rows after the cursor in this direction.
    pub fn continuation_op(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::parse(None)
    }
}

impl SortSpec {
    /// Parse `f1,-f2,...`. Later repeats of a field are ignored.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut keys: Vec<SortKey> = Vec::new();
        for token in raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let (field, direction) = match token.strip_prefix('-') {
                Some(field) => (field.trim(), Direction::Desc),
                None => (token, Direction::Asc),
            };
            if field.is_empty() || keys.iter().any(|k| k.field == field) {
                continue;
            }
            keys.push(SortKey {
                field: field.to_string(),
                direction,
            });
        }

        let mut spec = Self { keys };
        spec.append_tiebreakers();
        spec
    }

    fn append_tiebreakers(&mut self) {
        for field in TIEBREAKERS {
            if !self.keys.iter().any(|k| k.field == field) {
                self.keys.push(SortKey {
                    field: field.to_string(),
                    direction: Direction::Asc,
                });
            }
        }
    }

    /// Keep only keys accepted by `valid`. Tiebreakers are always kept.
    pub fn retain_valid(&self, mut valid: impl FnMut(&str) -> bool) -> Self {
        let keys = self
            .keys
            .iter()
            .filter(|k| TIEBREAKERS.contains(&k.field.as_str()) || valid(&k.field))
            .cloned()
            .collect();
        Self { keys }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.field.as_str())
    }

    /// Whether the spec contains the row-unique key.
    pub fn is_total(&self) -> bool {
        self.keys.iter().any(|k| k.field == "id")
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .keys
            .iter()
            .map(|k| match k.direction {
                Direction::Asc => k.field.clone(),
                Direction::Desc => format!("-{}", k.field),
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}
