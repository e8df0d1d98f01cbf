//! Column projection from the `fields` parameter.

use super::schema::Columns;

/// Columns that every projection keeps.
pub const ALWAYS_SELECTED: [&str; 2] = ["id", "created_at"];

/// Parsed `fields=f1,-f2` request.
///
/// A leading `-` marks an exclusion. Include wins when both kinds are given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSpec {
    include: Vec<String>,
    exclude: Vec<String>,
}

/// Resolved column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

impl ProjectionSpec {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut spec = Self::default();
        let Some(raw) = raw else {
            return spec;
        };
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.strip_prefix('-') {
                Some(name) if !name.is_empty() => push_unique(&mut spec.exclude, name),
                Some(_) => {}
                None => push_unique(&mut spec.include, token),
            }
        }
        spec
    }

    /// Resolve against the table schema.
    ///
    /// The always-selected columns are kept whenever the table has them, and
    /// requested names that are not columns are dropped.
    pub fn resolve(&self, columns: &Columns) -> Projection {
        if !self.include.is_empty() {
            let mut out: Vec<String> = Vec::new();
            for name in ALWAYS_SELECTED
                .iter()
                .copied()
                .chain(self.include.iter().map(String::as_str))
            {
                if columns.contains(name) {
                    push_unique(&mut out, name);
                }
            }
            return Projection::Columns(out);
        }

        if !self.exclude.is_empty() {
            let out: Vec<String> = columns
                .iter()
                .filter(|c| ALWAYS_SELECTED.contains(c) || !self.exclude.iter().any(|e| e == c))
                .map(str::to_string)
                .collect();
            if !out.is_empty() {
                return Projection::Columns(out);
            }
        }

        Projection::All
    }
}

impl Projection {
    /// Make sure `column` is selected. `All` already covers every column.
    pub fn require(&mut self, column: &str) {
        if let Self::Columns(cols) = self {
            push_unique(cols, column);
        }
    }

    pub fn selects(&self, column: &str) -> bool {
        match self {
            Self::All => true,
            Self::Columns(cols) => cols.iter().any(|c| c == column),
        }
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|existing| existing == name) {
        list.push(name.to_string());
    }
}
