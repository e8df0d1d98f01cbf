//! Custom Axum extractors for catalog requests.
//!
//! Every rejection is rendered through [`crate::Error`] so clients always see
//! the same `{"message": ...}` body.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts, OriginalUri, Path, Query, Request},
    http::{request::Parts, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::net::{IpAddr, SocketAddr};

use crate::db::query::QueryParameters;
use crate::db::Row;
use crate::Error;

/// Parsed list-query parameters.
pub struct ListQuery(pub QueryParameters);

#[async_trait]
impl<S> FromRequestParts<S> for ListQuery
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(items) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|e| Error::Validation(format!("Invalid query string: {e}")))?;
        Ok(Self(QueryParameters::from_items(&items)?))
    }
}

/// Typed path parameters. Segments that do not parse (e.g. a non-numeric
/// id) answer 404, as no such route exists.
pub struct IdPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for IdPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(_) => {
                // Nested routers see the URI without their mount prefix.
                let path = match parts.extensions.get::<OriginalUri>() {
                    Some(OriginalUri(uri)) => uri.path(),
                    None => parts.uri.path(),
                };
                Err(not_found(path))
            }
        }
    }
}

/// Body returned for unknown paths.
pub fn not_found(path: &str) -> Error {
    Error::NotFound(format!(
        "The requested path {path} was not found on server."
    ))
}

/// JSON object request body.
pub struct JsonBody(pub Row);

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<JsonValue>::from_request(req, state)
            .await
            .map_err(|e| Error::Validation(e.body_text()))?;

        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            _ => Err(Error::Validation(
                "Request body must be a JSON object".to_string(),
            )),
        }
    }
}

/// Best-effort client address for geolocation.
///
/// Prefers the first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
/// address when the server was started with connect info.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIp(pub Option<IpAddr>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(forwarded_ip(&parts.headers).or(peer)))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
}
