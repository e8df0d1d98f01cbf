//! Catalog API Routes
//!
//! `/stations/evses` is a static segment and is matched before the
//! `/stations/:station_id` parameter route.

use crate::api::handlers::{evses, sites, stations};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/sites", get(sites::list_sites).post(sites::create_site))
        .route(
            "/sites/:site_id",
            get(sites::read_site)
                .patch(sites::update_site)
                .delete(sites::delete_site),
        )
        .route(
            "/stations",
            get(stations::list_stations).post(stations::create_station),
        )
        .route("/stations/evses", get(evses::list_evses))
        .route(
            "/stations/:station_id",
            get(stations::read_station)
                .patch(stations::update_station)
                .delete(stations::delete_station),
        )
        .route(
            "/stations/:station_id/evses",
            get(evses::list_station_evses).post(evses::create_evse),
        )
        .route(
            "/stations/:station_id/evses/:evse_id",
            get(evses::read_evse)
                .patch(evses::update_evse)
                .delete(evses::delete_evse),
        )
}
