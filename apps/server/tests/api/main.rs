#[path = "../support/mod.rs"]
mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;
use station_catalog::db::query::Table;
use std::sync::Arc;
use support::{
    seed_evse, seed_site, seed_station, FixedLocator, MemoryStore, TestApp, UnreachableVerifier,
    DRIVER_TOKEN, OTHER_OWNER_TOKEN, OWNER_TOKEN, STAFF_TOKEN, UNKNOWN_ROLE_TOKEN,
};

fn site_body(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "owner_id": 7,
        "latitude": 37.33,
        "longitude": -121.88,
        "street_address": "1 Main St",
        "city": "San Jose",
        "state": "CA",
        "zip_code": "95112",
        "country": "US",
    })
}

#[tokio::test]
async fn health_and_metrics_are_public() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app.request(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, body) = app.request(Method::GET, "/metrics", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().is_some_and(|text| text.contains("# TYPE")));
    Ok(())
}

#[tokio::test]
async fn api_requires_a_bearer_token() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app.request(Method::GET, "/api/sites", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Missing token");

    let (status, body) = app.get("/api/sites", "bogus").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
    Ok(())
}

#[tokio::test]
async fn roles_are_gated_by_method() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _) = app.get("/api/sites", DRIVER_TOKEN).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = app
        .request(Method::POST, "/api/sites", Some(DRIVER_TOKEN), Some(site_body("Depot")))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Permission denied");
    assert!(app.store.rows(Table::Site).is_empty());

    let (status, _) = app.get("/api/sites", UNKNOWN_ROLE_TOKEN).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn unreachable_auth_service_is_retryable() -> anyhow::Result<()> {
    let app = TestApp::new()?.with_verifier(Arc::new(UnreachableVerifier));

    let (status, body) = app.get("/api/sites", STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
    Ok(())
}

#[tokio::test]
async fn disabled_auth_admits_anonymous_requests() -> anyhow::Result<()> {
    let app = TestApp::build(MemoryStore::new(), FixedLocator::failing(), |config| {
        config.auth.enabled = false;
    })?;
    seed_site(&app.store, "Depot", 7, 37.0, -122.0);

    let (status, _, body) = app.request(Method::GET, "/api/sites", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn owners_only_see_their_rows() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let mine = seed_site(&app.store, "Mine", 7, 37.0, -122.0);
    let theirs = seed_site(&app.store, "Theirs", 8, 37.0, -122.0);
    seed_station(&app.store, mine, "Mine A", 37.0, -122.0);
    seed_station(&app.store, theirs, "Theirs A", 37.0, -122.0);

    let (status, body) = app.get("/api/sites", OWNER_TOKEN).await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(names, ["Mine"]);

    let (_, body) = app.get("/api/stations", OWNER_TOKEN).await?;
    let names: Vec<&str> = body["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(names, ["Mine A"]);

    let (_, body) = app.get("/api/sites", STAFF_TOKEN).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    let (status, body) = app.get(&format!("/api/sites/{theirs}"), OWNER_TOKEN).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (status, body) = app.get("/api/sites/9999", OWNER_TOKEN).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Site not found");
    Ok(())
}

#[tokio::test]
async fn create_site_validates_and_rejects_duplicates() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let mut body = site_body("Depot");
    body["owner_id"] = json!(8);
    let (status, _, created) = app
        .request(Method::POST, "/api/sites", Some(OWNER_TOKEN), Some(body))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["owner_id"], 7);
    assert_eq!(created["name"], "Depot");
    assert!(created["id"].as_u64().is_some());
    assert!(created["created_at"].is_string());

    let (status, _, body) = app
        .request(Method::POST, "/api/sites", Some(STAFF_TOKEN), Some(site_body("Depot")))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().is_some_and(|m| m.contains("Site already exists")));

    let mut incomplete = site_body("Other");
    if let Some(map) = incomplete.as_object_mut() {
        map.remove("city");
    }
    let (status, _, body) = app
        .request(Method::POST, "/api/sites", Some(STAFF_TOKEN), Some(incomplete))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().is_some_and(|m| m.contains("city is required")));

    let (status, _, _) = app
        .request(Method::POST, "/api/sites", Some(STAFF_TOKEN), Some(json!([1, 2])))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.rows(Table::Site).len(), 1);
    Ok(())
}

#[tokio::test]
async fn station_create_requires_an_accessible_site() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let site = seed_site(&app.store, "Depot", 7, 37.0, -122.0);
    let station = |site_id: u64| json!({ "name": "Bay 1", "site_id": site_id, "latitude": 37.0, "longitude": -122.0 });

    let (status, _, body) = app
        .request(Method::POST, "/api/stations", Some(STAFF_TOKEN), Some(station(9999)))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Site not found");

    let (status, _, _) = app
        .request(Method::POST, "/api/stations", Some(OTHER_OWNER_TOKEN), Some(station(site)))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, created) = app
        .request(Method::POST, "/api/stations", Some(OWNER_TOKEN), Some(station(site)))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["site_name"], "Depot");
    assert_eq!(created["owner_id"], 7);
    assert_eq!(app.store.rows(Table::Station).len(), 1);
    Ok(())
}

#[tokio::test]
async fn evse_lifecycle() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let site = seed_site(&app.store, "Depot", 7, 37.0, -122.0);
    let station = seed_station(&app.store, site, "Bay 1", 37.1, -122.1);
    let evse = json!({ "evse_id": 1, "connector_type": "CCS", "charge_level": 2, "price": 0.25, "station_id": 4242 });
    let base = format!("/api/stations/{station}/evses");
    let path = format!("{base}/1");

    let (status, _, created) = app
        .request(Method::POST, &base, Some(OWNER_TOKEN), Some(evse.clone()))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["station_id"], station);
    assert_eq!(created["station_name"], "Bay 1");
    assert_eq!(created["latitude"], 37.1);

    let (status, _, _) = app
        .request(Method::POST, &base, Some(OWNER_TOKEN), Some(evse))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, read) = app.get(&path, DRIVER_TOKEN).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["connector_type"], "CCS");

    let (status, _, updated) = app
        .request(
            Method::PATCH,
            &path,
            Some(OWNER_TOKEN),
            Some(json!({ "price": 0.5, "station_id": 9, "evse_id": 9, "unknown": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 0.5);
    assert_eq!(updated["station_id"], station);
    assert_eq!(updated["evse_id"], 1);

    let (status, _, body) = app
        .request(Method::PATCH, &path, Some(OWNER_TOKEN), Some(json!({ "unknown": 1 })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().is_some_and(|m| m.contains("no updatable fields")));

    let (status, _, _) = app
        .request(Method::DELETE, &path, Some(OTHER_OWNER_TOKEN), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = app.request(Method::DELETE, &path, Some(OWNER_TOKEN), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = app.get(&path, STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn owners_cannot_reassign_sites() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let site = seed_site(&app.store, "Depot", 7, 37.0, -122.0);
    let path = format!("/api/sites/{site}");

    let (status, _, body) = app
        .request(Method::PATCH, &path, Some(OWNER_TOKEN), Some(json!({ "owner_id": 8, "city": "Campbell" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner_id"], 7);
    assert_eq!(body["city"], "Campbell");

    let (status, _, body) = app
        .request(Method::PATCH, &path, Some(STAFF_TOKEN), Some(json!({ "owner_id": 8 })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner_id"], 8);
    Ok(())
}

#[tokio::test]
async fn evses_list_across_and_within_stations() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    let site = seed_site(&app.store, "Depot", 7, 37.0, -122.0);
    let a = seed_station(&app.store, site, "Bay 1", 37.0, -122.0);
    let b = seed_station(&app.store, site, "Bay 2", 37.0, -122.0);
    seed_evse(&app.store, a, 1, "CCS");
    seed_evse(&app.store, a, 2, "CHAdeMO");
    seed_evse(&app.store, b, 1, "J1772");

    let (status, body) = app.get("/api/stations/evses", STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["cursor"]["next"], "");

    let (_, body) = app
        .get(&format!("/api/stations/{b}/evses?station_id={a}"), STAFF_TOKEN)
        .await?;
    let connectors: Vec<&str> = body["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|row| row["connector_type"].as_str())
        .collect();
    assert_eq!(connectors, ["J1772"]);

    let (_, body) = app
        .get("/api/stations/evses?connector_type=CCS&fields=evse_id", STAFF_TOKEN)
        .await?;
    let rows = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["evse_id"], 1);
    assert!(rows[0].get("connector_type").is_none());
    assert!(rows[0].get("id").is_some());
    Ok(())
}

#[tokio::test]
async fn list_paginates_with_cursor() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    for i in 1..=3 {
        seed_site(&app.store, &format!("Site {i}"), 7, 37.0, -122.0);
    }

    let (status, first) = app.get("/api/sites?limit=2", STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"].as_array().map(Vec::len), Some(2));
    let next = first["cursor"]["next"].as_str().unwrap_or_default().to_string();
    assert!(!next.is_empty());

    let (status, second) = app
        .get(&format!("/api/sites?limit=2&cursor={next}"), STAFF_TOKEN)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"][0]["name"], "Site 3");
    assert_eq!(second["cursor"]["next"], "");
    Ok(())
}

#[tokio::test]
async fn bad_list_parameters_are_client_errors() -> anyhow::Result<()> {
    let app = TestApp::new()?;
    seed_site(&app.store, "Depot", 7, 37.0, -122.0);

    for query in ["cursor=%25%25%25", "limit=abc", "limit=-1", "lat_lng_max=north"] {
        let (status, body) = app.get(&format!("/api/sites?{query}"), STAFF_TOKEN).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}: {body}");
        assert!(body["message"].is_string());
    }
    assert!(app.store.plans().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_paths_answer_json_404() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, body) = app.get("/nowhere", STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["message"],
        "The requested path /nowhere was not found on server."
    );

    let (status, body) = app.get("/api/sites/abc", STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["message"],
        "The requested path /api/sites/abc was not found on server."
    );
    Ok(())
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (_, headers, _) = app.request(Method::GET, "/health", None, None).await?;
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");

    let (_, headers, _) = app.request(Method::GET, "/api/sites", None, None).await?;
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    Ok(())
}

#[tokio::test]
async fn client_address_seeds_the_default_origin() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    seed_site(&store, "Near", 7, 40.0, -75.0);
    seed_site(&store, "Far", 7, 37.0, -122.0);
    let app = TestApp::build(store, FixedLocator::at(40.01, -75.01), |_| {})?;

    let (status, body) = app.get("/api/sites?lat_lng_origin=default", STAFF_TOKEN).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.locator.calls(), 1);
    let names: Vec<&str> = body["data"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(names, ["Near"]);
    Ok(())
}

#[tokio::test]
async fn conflicting_update_rolls_back() -> anyhow::Result<()> {
    for store in [MemoryStore::new(), MemoryStore::new().with_failing_rollback()] {
        let app = TestApp::build(store, FixedLocator::failing(), |_| {})?;
        seed_site(&app.store, "Depot", 7, 37.0, -122.0);
        let other = seed_site(&app.store, "Annex", 7, 37.0, -122.0);

        let (status, _, body) = app
            .request(
                Method::PATCH,
                &format!("/api/sites/{other}"),
                Some(STAFF_TOKEN),
                Some(json!({ "name": "Depot", "city": "Campbell" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().is_some_and(|m| m.contains("Site already exists")));

        let (_, row) = app.get(&format!("/api/sites/{other}"), STAFF_TOKEN).await?;
        assert_eq!(row["name"], "Annex");
        assert_eq!(row["city"], "San Jose");
    }
    Ok(())
}
