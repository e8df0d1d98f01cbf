//! IP geolocation collaborator.
//!
//! Used to find a default search origin for `lat_lng_origin=default`. Any
//! failure here is absorbed by the caller, which falls back to the
//! configured default origin.

use crate::config::GeoConfig;
use crate::db::query::LatLng;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub city: Option<String>,
    pub zip: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn lat_lng(&self) -> Result<LatLng> {
        LatLng::new(self.latitude, self.longitude)
    }
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation>;
}

/// Locator used when lookups are switched off; always fails.
pub struct DisabledLocator;

#[async_trait]
impl GeoLocator for DisabledLocator {
    async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation> {
        Err(Error::Upstream("IP geolocation is disabled".to_string()))
    }
}

/// MaxMind GeoLite2 City web service client.
pub struct MaxMindLocator {
    http: reqwest::Client,
    endpoint: String,
    account_id: String,
    license_key: String,
}

#[derive(Debug, Deserialize)]
struct CityResponse {
    city: Option<Names>,
    postal: Option<Postal>,
    location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct Names {
    #[serde(default)]
    names: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Postal {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl MaxMindLocator {
    pub fn new(config: &GeoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            license_key: config.license_key.clone(),
        })
    }
}

#[async_trait]
impl GeoLocator for MaxMindLocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoLocation> {
        if !is_routable(ip) {
            return Err(Error::Upstream(format!(
                "Address {ip} cannot be geolocated"
            )));
        }

        let url = format!("{}/{}", self.endpoint, ip);
        let res = self
            .http
            .get(url)
            .basic_auth(&self.account_id, Some(&self.license_key))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Geolocation request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::Upstream(format!(
                "Geolocation returned HTTP {}",
                res.status()
            )));
        }

        let body: CityResponse = res
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Geolocation JSON parse failed: {e}")))?;

        let (latitude, longitude) = match body.location {
            Some(Location {
                latitude: Some(lat),
                longitude: Some(lng),
            }) => (lat, lng),
            _ => {
                return Err(Error::Upstream(format!(
                    "Geolocation has no coordinates for {ip}"
                )))
            }
        };

        Ok(GeoLocation {
            city: body.city.and_then(|c| c.names.get("en").cloned()),
            zip: body.postal.and_then(|p| p.code),
            latitude,
            longitude,
        })
    }
}

/// Loopback, private and unspecified addresses have no public location.
fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}
