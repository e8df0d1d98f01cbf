//! Fixed enumeration of the catalog's tables and views.
//!
//! Table identifiers are concatenated into SQL text, so they only ever come
//! from this enum, never from request input.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Site,
    Station,
    Evse,
    StationView,
    EvseView,
}

impl Table {
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Site => "Site",
            Self::Station => "Station",
            Self::Evse => "EVSE",
            Self::StationView => "stations_joined",
            Self::EvseView => "evses_joined",
        }
    }

    /// Columns covered by the table's full-text index, in index order.
    pub fn search_fields(self) -> &'static [&'static str] {
        match self {
            Self::Site => &["name", "street_address", "city"],
            Self::StationView => &["site_name", "street_address", "city"],
            Self::Station | Self::Evse | Self::EvseView => &[],
        }
    }

    /// The relation rows are read back from after a write.
    pub fn read_view(self) -> Table {
        match self {
            Self::Station => Self::StationView,
            Self::Evse => Self::EvseView,
            other => other,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Back-quote an identifier that has already passed the column allow-list.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
