//! EVSE handlers
//!
//! EVSEs are addressed by `(station_id, evse_id)`; `evse_id` is only unique
//! within its station.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    api::extractors::{ClientIp, IdPath, JsonBody, ListQuery},
    auth::AuthenticatedPrincipal,
    services::{Resource, ResourceKey},
    state::AppState,
    Result,
};

fn evse_key((station_id, evse_id): (i64, i64)) -> ResourceKey {
    ResourceKey::Evse {
        station_id,
        evse_id,
    }
}

/// GET /api/stations/evses
pub async fn list_evses(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    ClientIp(client_ip): ClientIp,
    ListQuery(params): ListQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .catalog
        .list(Resource::Evse, &principal, params, client_ip)
        .await?;
    Ok(Json(page))
}

/// GET /api/stations/:station_id/evses
pub async fn list_station_evses(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(station_id): IdPath<i64>,
    ClientIp(client_ip): ClientIp,
    ListQuery(params): ListQuery,
) -> Result<impl IntoResponse> {
    let page = state
        .catalog
        .list_station_evses(station_id, &principal, params, client_ip)
        .await?;
    Ok(Json(page))
}

/// GET /api/stations/:station_id/evses/:evse_id
pub async fn read_evse(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(ids): IdPath<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let row = state.catalog.read(evse_key(ids), &principal).await?;
    Ok(Json(row))
}

/// POST /api/stations/:station_id/evses
pub async fn create_evse(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(station_id): IdPath<i64>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse> {
    let row = state
        .catalog
        .create_evse(&principal, station_id, body)
        .await?;
    tracing::info!(station_id, evse_id = ?row.get("evse_id"), "EVSE created");
    Ok((StatusCode::CREATED, Json(row)))
}

/// PATCH /api/stations/:station_id/evses/:evse_id
pub async fn update_evse(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(ids): IdPath<(i64, i64)>,
    JsonBody(body): JsonBody,
) -> Result<impl IntoResponse> {
    let row = state
        .catalog
        .update(evse_key(ids), &principal, body)
        .await?;
    Ok(Json(row))
}

/// DELETE /api/stations/:station_id/evses/:evse_id
pub async fn delete_evse(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    IdPath(ids): IdPath<(i64, i64)>,
) -> Result<impl IntoResponse> {
    state.catalog.delete(evse_key(ids), &principal).await?;
    tracing::info!(station_id = ids.0, evse_id = ids.1, "EVSE deleted");
    Ok(StatusCode::NO_CONTENT)
}
