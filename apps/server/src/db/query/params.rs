//! Typed view of list-request query parameters.

use super::geo::{GeoRequest, LatLng, OriginRequest};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameters {
    pub search: Option<String>,
    pub sort: Option<String>,
    pub fields: Option<String>,
    pub geo: GeoRequest,
    /// `None` means unbounded; `limit=0` is normalized to `None`.
    pub limit: Option<u64>,
    pub cursor: Option<String>,
    /// Non-reserved pairs in request order.
    pub filters: Vec<(String, String)>,
}

impl QueryParameters {
    /// Parse ordered `(key, value)` items. For a repeated key the first
    /// non-empty value wins.
    pub fn from_items(items: &[(String, String)]) -> Result<Self> {
        let mut out = Self::default();

        for (key, value) in items {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "search" => set_once(&mut out.search, value),
                "sort" | "sort_by" => set_once(&mut out.sort, value),
                "fields" => set_once(&mut out.fields, value),
                "cursor" => set_once(&mut out.cursor, value),
                "limit" => {
                    if out.limit.is_none() {
                        let parsed: u64 = value.parse().map_err(|_| {
                            Error::Validation(format!("Invalid limit value: {value}"))
                        })?;
                        out.limit = (parsed > 0).then_some(parsed);
                    }
                }
                "lat_lng_origin" => {
                    if out.geo.origin.is_none() {
                        out.geo.origin = Some(if value.eq_ignore_ascii_case("default") {
                            OriginRequest::Default
                        } else {
                            OriginRequest::At(value.parse::<LatLng>()?)
                        });
                    }
                }
                "lat_lng_min" => {
                    if out.geo.min.is_none() {
                        out.geo.min = Some(value.parse()?);
                    }
                }
                "lat_lng_max" => {
                    if out.geo.max.is_none() {
                        out.geo.max = Some(value.parse()?);
                    }
                }
                _ => out.filters.push((key.clone(), value.to_string())),
            }
        }

        Ok(out)
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}
