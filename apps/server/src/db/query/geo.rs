//! Geographic origin, bounding box and great-circle distance.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::Validation(format!("Latitude out of range: {lat}")));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(Error::Validation(format!("Longitude out of range: {lng}")));
        }
        Ok(Self { lat, lng })
    }

    /// Axis-aligned offset in degrees; not clamped, callers use it for boxes.
    fn offset(self, delta: f64) -> Self {
        Self {
            lat: self.lat + delta,
            lng: self.lng + delta,
        }
    }
}

impl FromStr for LatLng {
    type Err = Error;

    /// Parse the wire form `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Validation(format!("Invalid coordinate pair '{s}', expected 'lat,lng'"));
        let (lat, lng) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lng: f64 = lng.trim().parse().map_err(|_| invalid())?;
        Self::new(lat, lng)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Haversine great-circle distance in kilometres.
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// How the request asked for an origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OriginRequest {
    /// `lat_lng_origin=default`: locate the caller, then derive a box.
    Default,
    /// `lat_lng_origin=lat,lng`.
    At(LatLng),
}

/// Unresolved geo parameters as parsed from the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoRequest {
    pub origin: Option<OriginRequest>,
    pub min: Option<LatLng>,
    pub max: Option<LatLng>,
}

impl GeoRequest {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.min.is_none() && self.max.is_none()
    }

    pub fn wants_located_origin(&self) -> bool {
        matches!(self.origin, Some(OriginRequest::Default))
    }
}

/// Resolved origin and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoSpec {
    origin: Option<LatLng>,
    min: Option<LatLng>,
    max: Option<LatLng>,
}

impl GeoSpec {
    /// Resolve a request into a spec.
    ///
    /// `located` is the origin found for a `default` request (lookup result or
    /// configured fallback). A located origin gets a square box of
    /// `half_width` degrees; explicit `min`/`max` replace either side of it.
    pub fn resolve(request: &GeoRequest, located: Option<LatLng>, half_width: f64) -> Option<Self> {
        let (origin, derived) = match request.origin {
            Some(OriginRequest::At(point)) => (Some(point), None),
            Some(OriginRequest::Default) => match located {
                Some(point) => (Some(point), Some(derived_box(point, half_width))),
                None => (None, None),
            },
            None => (None, None),
        };

        let spec = Self {
            origin,
            min: request.min.or(derived.map(|(min, _)| min)),
            max: request.max.or(derived.map(|(_, max)| max)),
        };

        if spec.origin.is_none() && spec.min.is_none() && spec.max.is_none() {
            None
        } else {
            Some(spec)
        }
    }

    pub fn origin(&self) -> Option<LatLng> {
        self.origin
    }

    pub fn min(&self) -> Option<LatLng> {
        self.min
    }

    pub fn max(&self) -> Option<LatLng> {
        self.max
    }
}

/// Square of half-width `delta` degrees around `origin`.
///
/// This is an axis-aligned approximation, not a geodesic disk.
pub fn derived_box(origin: LatLng, delta: f64) -> (LatLng, LatLng) {
    (origin.offset(-delta), origin.offset(delta))
}
