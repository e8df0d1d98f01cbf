//! Station handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    api::extractors::{ClientIp, IdPath, JsonBody, ListQuery},
    auth::AuthenticatedPrincipal,
    services::{Resource, ResourceKey},
    state::AppState,
    Result,
};

/// GET /api/stations
pub async fn list_stations(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    ClientIp(client_ip): ClientIp,
    ListQuery(params): ListQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .catalog
        .list(Resource::Station, &principal, params, client_ip)
        .await?;
    Ok(Json(page))
}

/// GET /api/stations/:station_id
pub async fn read_station(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(station_id): IdPath<i64>,
) -> Result<impl IntoResponse> {
    let row = state
        .catalog
        .read(ResourceKey::Station(station_id), &principal)
        .await?;
    Ok(Json(row))
}

/// POST /api/stations
pub async fn create_station(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse> {
    let row = state.catalog.create_station(&principal, body).await?;
    tracing::info!(id = ?row.get("id"), site_id = ?row.get("site_id"), "Station created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// PATCH /api/stations/:station_id
pub async fn update_station(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(station_id): IdPath<i64>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse> {
    let row = state
        .catalog
        .update(ResourceKey::Station(station_id), &principal, body)
        .await?;
    Ok(Json(row))
}

/// DELETE /api/stations/:station_id
pub async fn delete_station(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(station_id): IdPath<i64>,
) -> Result<impl IntoResponse> {
    state
        .catalog
        .delete(ResourceKey::Station(station_id), &principal)
        .await?;
    tracing::info!(station_id, "Station deleted");
    Ok(StatusCode::NO_CONTENT)
}
