#![allow(dead_code)]


use anyhow::Context as _;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value as JsonValue};
use station_catalog::{
    api::create_router,
    auth::{Principal, Role, TokenVerifier},
    db::query::Table,
    geo::{GeoLocation, GeoLocator},
    AppState, Config, Error, Result,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt as _;

pub use memory::MemoryStore;

pub const STAFF_TOKEN: &str = "staff-token";
pub const OWNER_TOKEN: &str = "owner-7";
pub const OTHER_OWNER_TOKEN: &str = "owner-8";
pub const DRIVER_TOKEN: &str = "driver-token";
pub const UNKNOWN_ROLE_TOKEN: &str = "admin-token";

/// Verifier with a fixed token table.
pub struct StaticVerifier {
    tokens: HashMap<String, Principal>,
}

impl Default for StaticVerifier {
    fn default() -> Self {
        let principal = |id: &str, role| Principal {
            id: id.to_string(),
            role,
        };
        let tokens = HashMap::from([
            (STAFF_TOKEN.to_string(), principal("1", Role::Staff)),
            (OWNER_TOKEN.to_string(), principal("7", Role::Owner)),
            (OTHER_OWNER_TOKEN.to_string(), principal("8", Role::Owner)),
            (DRIVER_TOKEN.to_string(), principal("20", Role::Driver)),
            (UNKNOWN_ROLE_TOKEN.to_string(), principal("2", Role::Unknown)),
        ]);
        Self { tokens }
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Principal> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| Error::Unauthorized("Invalid token".to_string()))
    }
}

/// Verifier whose backing service is down.
pub struct UnreachableVerifier;

#[async_trait]
impl TokenVerifier for UnreachableVerifier {
    async fn verify(&self, _token: &str) -> Result<Principal> {
        Err(Error::Upstream("connection refused".to_string()))
    }
}

/// Locator answering every address with one location, or failing.
#[derive(Default)]
pub struct FixedLocator {
    location: Option<GeoLocation>,
    calls: AtomicUsize,
}

impl FixedLocator {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            location: Some(GeoLocation {
                city: Some("Testville".to_string()),
                zip: None,
                latitude,
                longitude,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLocator for FixedLocator {
    async fn locate(&self, _ip: IpAddr) -> Result<GeoLocation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.location
            .clone()
            .ok_or_else(|| Error::Upstream("lookup failed".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub locator: Arc<FixedLocator>,
}

impl TestApp {
    pub fn new() -> anyhow::Result<Self> {
        Self::build(MemoryStore::new(), FixedLocator::failing(), |_| {})
    }

    pub fn build(
        store: MemoryStore,
        locator: FixedLocator,
        configure: impl FnOnce(&mut Config),
    ) -> anyhow::Result<Self> {
        let mut config = Config::default();
        configure(&mut config);

        let locator = Arc::new(locator);
        let state = AppState::from_parts(
            config,
            Arc::new(store.clone()),
            locator.clone(),
            Arc::new(StaticVerifier::default()),
        )
        .context("build app state")?;

        Ok(Self {
            router: create_router(state.clone()),
            state,
            store,
            locator,
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.state.verifier = verifier;
        self.router = create_router(self.state.clone());
        self
    }

    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        token: Option<&str>,
        body: Option<JsonValue>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, JsonValue)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.9");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder
            .body(match body {
                Some(json) => Body::from(serde_json::to_vec(&json)?),
                None => Body::empty(),
            })
            .context("build request")?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                JsonValue::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        Ok((status, headers, json))
    }

    pub async fn get(&self, path: &str, token: &str) -> anyhow::Result<(StatusCode, JsonValue)> {
        let (status, _, body) = self.request(Method::GET, path, Some(token), None).await?;
        Ok((status, body))
    }
}

/// A site owned by `owner_id`; returns its id.
pub fn seed_site(store: &MemoryStore, name: &str, owner_id: i64, lat: f64, lng: f64) -> u64 {
    store.seed(
        Table::Site,
        json!({
            "name": name,
            "owner_id": owner_id,
            "latitude": lat,
            "longitude": lng,
            "street_address": format!("{name} street"),
            "city": "San Jose",
            "state": "CA",
            "zip_code": "95112",
            "country": "US",
        }),
    )
}

pub fn seed_station(store: &MemoryStore, site_id: u64, name: &str, lat: f64, lng: f64) -> u64 {
    store.seed(
        Table::Station,
        json!({ "name": name, "site_id": site_id, "latitude": lat, "longitude": lng }),
    )
}

pub fn seed_evse(store: &MemoryStore, station_id: u64, evse_id: i64, connector: &str) -> u64 {
    store.seed(
        Table::Evse,
        json!({
            "station_id": station_id,
            "evse_id": evse_id,
            "connector_type": connector,
            "charge_level": 2,
            "price": 0.3,
        }),
    )
}
