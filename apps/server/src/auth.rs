//! Authentication / Authorization primitives.
//!
//! Bearer tokens are verified by an external auth service, which answers with
//! the caller's id and role. Route access is decided by role; row-level
//! ownership is enforced by the catalog service.

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Method},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::{config::AuthConfig, db::Row, state::AppState, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    All,
    Staff,
    Owner,
    Driver,
    /// Any role this service does not know; never permitted.
    #[serde(other)]
    Unknown,
}

/// Roles allowed to read catalog resources.
pub const READ_ROLES: &[Role] = &[Role::All, Role::Staff, Role::Owner, Role::Driver];
/// Roles allowed to create, update or delete catalog resources.
pub const WRITE_ROLES: &[Role] = &[Role::Staff, Role::Owner];

/// Roles permitted for a request method.
pub fn permitted_roles(method: &Method) -> &'static [Role] {
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        READ_ROLES
    } else {
        WRITE_ROLES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub role: Role,
}

impl Principal {
    /// Principal used when authentication is disabled.
    pub fn local_staff() -> Self {
        Self {
            id: "local".to_string(),
            role: Role::Staff,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    /// Whether this principal may touch `row`. Only owners are restricted.
    pub fn may_access(&self, row: &Row) -> bool {
        !self.is_owner() || row.get("owner_id").is_some_and(|v| same_id(v, &self.id))
    }

    /// The principal id as it should be stored in an `owner_id` column.
    pub fn id_value(&self) -> JsonValue {
        match self.id.parse::<i64>() {
            Ok(n) => JsonValue::from(n),
            Err(_) => JsonValue::String(self.id.clone()),
        }
    }
}

/// Compare a stored id (number or string) with a principal id.
pub fn same_id(stored: &JsonValue, id: &str) -> bool {
    match stored {
        JsonValue::String(s) => s == id,
        JsonValue::Number(n) => n.to_string() == id,
        _ => false,
    }
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal>;
}

/// Verifies tokens against `{endpoint}/verify`.
pub struct HttpTokenVerifier {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTokenVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal> {
        let res = self
            .http
            .post(format!("{}/verify", self.endpoint))
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Token verification failed: {e}")))?;

        let status = res.status();
        if status.is_client_error() {
            let message = res
                .json::<JsonValue>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| "Invalid token".to_string());
            return Err(if status == reqwest::StatusCode::FORBIDDEN {
                Error::Forbidden(message)
            } else {
                Error::Unauthorized(message)
            });
        }
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "Token verification returned HTTP {status}"
            )));
        }

        res.json::<Principal>()
            .await
            .map_err(|e| Error::Upstream(format!("Token verification JSON parse failed: {e}")))
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Error::Unauthorized("Missing token".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| Error::Unauthorized("Authorization header is not valid UTF-8".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| Error::Unauthorized("Authorization header must be 'Bearer <token>'".to_string()))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(Error::Unauthorized(
            "Authorization header must be 'Bearer <token>'".to_string(),
        ));
    }
    Ok(token)
}

/// Extractor for the authenticated principal attached by middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedPrincipal)
            .ok_or_else(|| Error::Unauthorized("Missing token".to_string()).into_response())
    }
}

/// Middleware attaching the `Principal` (or rejecting) on `/api` routes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if !state.config.auth.enabled {
        req.extensions_mut().insert(Principal::local_staff());
        return next.run(req).await;
    }

    let principal = match authenticate(&state, req.headers()).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    if !permitted_roles(req.method()).contains(&principal.role) {
        tracing::debug!(role = ?principal.role, method = %req.method(), "Role not permitted");
        return Error::Forbidden("Permission denied".to_string()).into_response();
    }

    tracing::Span::current().record("user_id", principal.id.as_str());
    req.extensions_mut().insert(principal);
    next.run(req).await
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal> {
    let token = bearer_token(headers)?;
    state.verifier.verify(token).await
}
