//! API layer - routes, handlers, and middleware

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;

use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, OriginalUri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_request_body_bytes;
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let api_router = routes::catalog::catalog_routes()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::auth_middleware,
        ))
        .layer(middleware::cors(&cors_origins));

    Router::new()
        .route("/health", get(health_check))
        .merge(routes::metrics::metrics_routes())
        .nest("/api", api_router)
        .fallback(path_not_found)
        .with_state(state)
        // Applied in reverse order
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(middleware::compression())
        .layer(DefaultBodyLimit::max(max_body_size))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "station-catalog"
    }))
}

async fn path_not_found(OriginalUri(uri): OriginalUri) -> Response {
    extractors::not_found(uri.path()).into_response()
}
