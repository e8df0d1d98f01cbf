//! Site handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    api::extractors::{ClientIp, IdPath, JsonBody, ListQuery},
    auth::AuthenticatedPrincipal,
    services::{Resource, ResourceKey},
    state::AppState,
    Result,
};

/// GET /api/sites
pub async fn list_sites(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    ClientIp(client_ip): ClientIp,
    ListQuery(params): ListQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .catalog
        .list(Resource::Site, &principal, params, client_ip)
        .await?;
    Ok(Json(page))
}

/// GET /api/sites/:site_id
pub async fn read_site(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(site_id): IdPath<i64>,
) -> Result<impl IntoResponse> {
    let row = state
        .catalog
        .read(ResourceKey::Site(site_id), &principal)
        .await?;
    Ok(Json(row))
}

/// POST /api/sites
pub async fn create_site(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse> {
    let row = state.catalog.create_site(&principal, body).await?;
    tracing::info!(id = ?row.get("id"), owner_id = ?row.get("owner_id"), "Site created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// PATCH /api/sites/:site_id
pub async fn update_site(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(site_id): IdPath<i64>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse> {
    let row = state
        .catalog
        .update(ResourceKey::Site(site_id), &principal, body)
        .await?;
    Ok(Json(row))
}

/// DELETE /api/sites/:site_id
pub async fn delete_site(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(site_id): IdPath<i64>,
) -> Result<impl IntoResponse> {
    state
        .catalog
        .delete(ResourceKey::Site(site_id), &principal)
        .await?;
    tracing::info!(site_id, "Site deleted");
    Ok(StatusCode::NO_CONTENT)
}
