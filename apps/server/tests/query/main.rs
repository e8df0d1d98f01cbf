#[path = "../support/mod.rs"]
mod support;

use serde_json::json;
use station_catalog::db::query::{
    cursor, BindValue, LatLng, ListRequest, Page, QueryEngine, QueryParameters, QuerySettings,
    SchemaCatalog, Scope, SortSpec, Table,
};
use station_catalog::Error;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use support::{seed_site, FixedLocator, MemoryStore};

fn engine_with(store: &MemoryStore, locator: Arc<FixedLocator>, timeout: Duration) -> QueryEngine {
    let store = Arc::new(store.clone());
    let schema = Arc::new(SchemaCatalog::new(store.clone(), Duration::ZERO));
    QueryEngine::new(
        store,
        schema,
        locator,
        QuerySettings {
            box_half_width: 0.125,
            default_origin: LatLng::new(37.3387, -121.8853).unwrap(),
            request_timeout: timeout,
        },
    )
}

fn engine(store: &MemoryStore) -> QueryEngine {
    engine_with(store, Arc::new(FixedLocator::failing()), Duration::from_secs(5))
}

fn params(pairs: &[(&str, &str)]) -> QueryParameters {
    let items: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    QueryParameters::from_items(&items).unwrap()
}

fn ids(page: &Page) -> Vec<u64> {
    page.data
        .iter()
        .map(|row| row["id"].as_u64().unwrap())
        .collect()
}

fn seed_five_sites(store: &MemoryStore) -> Vec<u64> {
    (1..=5)
        .map(|i| seed_site(store, &format!("Site {i}"), 7, 37.0 + i as f64 * 0.01, -122.0))
        .collect()
}

/// Fetch every page of `base`, following cursors.
async fn fetch_all(engine: &QueryEngine, table: Table, base: &[(&str, &str)]) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut pairs: Vec<(&str, &str)> = base.to_vec();
        if let Some(token) = cursor.as_deref() {
            pairs.push(("cursor", token));
        }
        let page = engine
            .list(&ListRequest::new(table, params(&pairs)))
            .await
            .unwrap();
        let next = page.cursor.next.clone();
        pages.push(page);
        if next.is_empty() {
            return pages;
        }
        assert!(pages.len() < 50, "pagination did not terminate");
        cursor = Some(next);
    }
}

#[tokio::test]
async fn five_sites_page_by_two() {
    let store = MemoryStore::new();
    let sites = seed_five_sites(&store);
    let engine = engine(&store);

    let pages = fetch_all(&engine, Table::Site, &[("limit", "2")]).await;

    assert_eq!(pages.len(), 3);
    assert_eq!(ids(&pages[0]), sites[0..2].to_vec());
    assert_eq!(ids(&pages[1]), sites[2..4].to_vec());
    assert_eq!(ids(&pages[2]), sites[4..5].to_vec());

    let sort = SortSpec::default();
    assert_eq!(pages[0].cursor.next, cursor::encode(&pages[0].data[1], &sort));
    assert_eq!(pages[1].cursor.next, cursor::encode(&pages[1].data[1], &sort));
    assert_eq!(pages[2].cursor.next, "");
}

#[tokio::test]
async fn pages_cover_every_row_once_for_any_limit() {
    let store = MemoryStore::new();
    let cities = ["Palo Alto", "Cupertino", "Palo Alto", "San Jose", "Cupertino", "Campbell", "San Jose"];
    for (i, city) in cities.iter().enumerate() {
        store.seed(
            Table::Site,
            json!({
                "name": format!("Site {i}"),
                "owner_id": 1,
                "latitude": 37.0,
                "longitude": -122.0,
                "city": city,
            }),
        );
    }
    let all: HashSet<u64> = store
        .rows(Table::Site)
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    let engine = engine(&store);

    for sort in ["city", "-city", "-city,name"] {
        for limit in 1..=8 {
            let limit = limit.to_string();
            let pages = fetch_all(&engine, Table::Site, &[("sort", sort), ("limit", limit.as_str())]).await;
            let rows: Vec<_> = pages.iter().flat_map(|p| p.data.iter()).collect();

            let seen: Vec<u64> = rows.iter().map(|r| r["id"].as_u64().unwrap()).collect();
            let unique: HashSet<u64> = seen.iter().copied().collect();
            assert_eq!(seen.len(), unique.len(), "duplicate rows for sort={sort} limit={limit}");
            assert_eq!(unique, all, "missing rows for sort={sort} limit={limit}");

            let cities: Vec<&str> = rows.iter().map(|r| r["city"].as_str().unwrap()).collect();
            let mut expected = cities.clone();
            expected.sort();
            if sort.starts_with('-') {
                expected.reverse();
            }
            assert_eq!(cities, expected, "order broken for sort={sort} limit={limit}");
        }
    }
}

#[tokio::test]
async fn distance_sort_pages_cover_every_row_once() {
    let store = MemoryStore::new();
    // Groups of sites sharing coordinates, so distances tie across page boundaries.
    let spots = [(37.41, -122.1), (37.45, -122.1), (37.41, -122.1), (37.5, -122.2), (37.45, -122.1), (37.41, -122.1)];
    let all: HashSet<u64> = spots
        .iter()
        .enumerate()
        .map(|(i, (lat, lng))| seed_site(&store, &format!("Site {i}"), 7, *lat, *lng))
        .collect();
    let engine = engine(&store);

    for sort in ["distance", "-distance"] {
        for limit in 1..=all.len() + 1 {
            let limit = limit.to_string();
            let pages = fetch_all(
                &engine,
                Table::Site,
                &[("lat_lng_origin", "37.4,-122.1"), ("sort", sort), ("limit", limit.as_str())],
            )
            .await;
            let rows: Vec<_> = pages.iter().flat_map(|p| p.data.iter()).collect();

            let seen: Vec<u64> = rows.iter().map(|r| r["id"].as_u64().unwrap()).collect();
            let unique: HashSet<u64> = seen.iter().copied().collect();
            assert_eq!(seen.len(), unique.len(), "duplicate rows for sort={sort} limit={limit}");
            assert_eq!(unique, all, "missing rows for sort={sort} limit={limit}");

            let distances: Vec<f64> = rows.iter().map(|r| r["distance"].as_f64().unwrap()).collect();
            assert!(distances.iter().all(|d| *d > 0.0));
            let ordered = distances.windows(2).all(|w| {
                if sort == "distance" {
                    w[0] <= w[1]
                } else {
                    w[0] >= w[1]
                }
            });
            assert!(ordered, "order broken for sort={sort} limit={limit}: {distances:?}");
        }
    }
}

#[tokio::test]
async fn next_token_empty_only_on_short_page_or_without_limit() {
    let store = MemoryStore::new();
    seed_five_sites(&store);
    store.seed(
        Table::Site,
        json!({ "name": "Site 6", "owner_id": 7, "latitude": 37.5, "longitude": -122.0 }),
    );
    let engine = engine(&store);

    let unbounded = engine
        .list(&ListRequest::new(Table::Site, params(&[])))
        .await
        .unwrap();
    assert_eq!(unbounded.data.len(), 6);
    assert_eq!(unbounded.cursor.next, "");

    // Six rows by three: the second page is full, so a third (empty) page follows.
    let pages = fetch_all(&engine, Table::Site, &[("limit", "3")]).await;
    assert_eq!(pages.len(), 3);
    assert!(!pages[1].cursor.next.is_empty());
    assert!(pages[2].data.is_empty());
    assert_eq!(pages[2].cursor.next, "");
}

#[tokio::test]
async fn malformed_cursor_fails_before_fetching() {
    let store = MemoryStore::new();
    seed_five_sites(&store);
    let engine = engine(&store);

    for token in ["%%%not-base64", "bm90IGpzb24", "WzEsMl0"] {
        let err = engine
            .list(&ListRequest::new(Table::Site, params(&[("cursor", token)])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedCursor(_)), "token {token}: {err:?}");
    }
    assert!(store.plans().is_empty());
}

#[tokio::test]
async fn slow_fetch_times_out() {
    let store = MemoryStore::new().with_fetch_delay(Duration::from_millis(500));
    seed_five_sites(&store);
    let engine = engine_with(
        &store,
        Arc::new(FixedLocator::failing()),
        Duration::from_millis(20),
    );

    let err = engine
        .list(&ListRequest::new(Table::Site, params(&[])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test]
async fn slow_schema_load_counts_against_the_timeout() {
    let store = MemoryStore::new().with_schema_delay(Duration::from_millis(500));
    seed_five_sites(&store);
    let engine = engine_with(
        &store,
        Arc::new(FixedLocator::failing()),
        Duration::from_millis(20),
    );

    let err = engine
        .list(&ListRequest::new(Table::Site, params(&[])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(store.plans().is_empty());
}

#[tokio::test]
async fn scope_on_missing_column_denies_everything() {
    let store = MemoryStore::new();
    seed_five_sites(&store);
    store.hide_column(Table::Site, "owner_id");
    let engine = engine(&store);

    let request = ListRequest::new(Table::Site, params(&[]))
        .with_scope(Some(Scope::new("owner_id", BindValue::Text("7".into()))));
    let page = engine.list(&request).await.unwrap();

    assert!(page.data.is_empty());
    let plan = store.last_plan().unwrap();
    assert!(plan.sql().contains("WHERE 1=0"), "{}", plan.sql());
}

#[tokio::test]
async fn scope_restricts_to_matching_rows() {
    let store = MemoryStore::new();
    seed_site(&store, "Mine", 7, 37.0, -122.0);
    seed_site(&store, "Theirs", 8, 37.0, -122.0);
    let engine = engine(&store);

    let request = ListRequest::new(Table::Site, params(&[("owner_id", "8")]))
        .with_scope(Some(Scope::new("owner_id", BindValue::Text("7".into()))));
    let page = engine.list(&request).await.unwrap();

    // A request filter cannot widen the scope.
    assert!(page.data.is_empty());

    let request = ListRequest::new(Table::Site, params(&[]))
        .with_scope(Some(Scope::new("owner_id", BindValue::Text("7".into()))));
    let page = engine.list(&request).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0]["name"], "Mine");
}

#[tokio::test]
async fn default_origin_is_located_from_client_address() {
    let store = MemoryStore::new();
    seed_site(&store, "Inside", 1, 37.45, -122.05);
    seed_site(&store, "Outside", 1, 38.5, -122.05);
    let locator = Arc::new(FixedLocator::at(37.4, -122.1));
    let engine = engine_with(&store, locator.clone(), Duration::from_secs(5));

    let ip: IpAddr = "203.0.113.9".parse().unwrap();
    let request = ListRequest::new(Table::Site, params(&[("lat_lng_origin", "default")]))
        .with_client_ip(Some(ip));
    let page = engine.list(&request).await.unwrap();

    assert_eq!(locator.calls(), 1);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0]["name"], "Inside");
    assert!(page.data[0]["distance"].as_f64().unwrap() > 0.0);

    let geo = *store.last_plan().unwrap().geo().unwrap();
    let min = geo.min().unwrap();
    let max = geo.max().unwrap();
    assert!((min.lat - 37.275).abs() < 1e-9 && (min.lng + 122.225).abs() < 1e-9);
    assert!((max.lat - 37.525).abs() < 1e-9 && (max.lng + 121.975).abs() < 1e-9);
}

#[tokio::test]
async fn failed_lookup_falls_back_to_default_origin() {
    let store = MemoryStore::new();
    seed_site(&store, "Downtown", 1, 37.34, -121.89);
    let locator = Arc::new(FixedLocator::failing());
    let engine = engine_with(&store, locator.clone(), Duration::from_secs(5));

    let request = ListRequest::new(Table::Site, params(&[("lat_lng_origin", "default")]))
        .with_client_ip(Some("203.0.113.9".parse().unwrap()));
    let page = engine.list(&request).await.unwrap();

    assert_eq!(locator.calls(), 1);
    assert_eq!(page.data.len(), 1);
    let origin = store.last_plan().unwrap().origin().unwrap();
    assert_eq!(origin, LatLng::new(37.3387, -121.8853).unwrap());

    // Without an address there is nothing to look up.
    let request = ListRequest::new(Table::Site, params(&[("lat_lng_origin", "default")]));
    engine.list(&request).await.unwrap();
    assert_eq!(locator.calls(), 1);
}

#[tokio::test]
async fn explicit_origin_sorts_by_distance() {
    let store = MemoryStore::new();
    let far = seed_site(&store, "Far", 1, 37.9, -122.0);
    let near = seed_site(&store, "Near", 1, 37.41, -122.1);
    let engine = engine(&store);

    let page = engine
        .list(&ListRequest::new(
            Table::Site,
            params(&[("lat_lng_origin", "37.4,-122.1"), ("sort", "distance")]),
        ))
        .await
        .unwrap();

    assert_eq!(ids(&page), vec![near, far]);
}

#[tokio::test]
async fn distance_sort_without_origin_is_dropped() {
    let store = MemoryStore::new();
    let sites = seed_five_sites(&store);
    let engine = engine(&store);

    let page = engine
        .list(&ListRequest::new(Table::Site, params(&[("sort", "-distance")])))
        .await
        .unwrap();

    assert_eq!(ids(&page), sites);
    let plan = store.last_plan().unwrap();
    assert_eq!(plan.sort().to_string(), "created_at,id");
    assert!(!plan.sql().contains("distance"));
}

#[tokio::test]
async fn search_ranks_and_filters() {
    let store = MemoryStore::new();
    store.seed(
        Table::Site,
        json!({ "name": "Palo Alto Station", "owner_id": 1, "city": "Palo Alto" }),
    );
    store.seed(
        Table::Site,
        json!({ "name": "Alto Plaza", "owner_id": 1, "city": "Mountain View" }),
    );
    store.seed(
        Table::Site,
        json!({ "name": "Depot", "owner_id": 1, "city": "Fremont" }),
    );
    let engine = engine(&store);

    let page = engine
        .list(&ListRequest::new(
            Table::Site,
            params(&[("search", "Palo Alto"), ("sort", "-search_score")]),
        ))
        .await
        .unwrap();

    let names: Vec<&str> = page.data.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Palo Alto Station", "Alto Plaza"]);
    assert!(page.data[0]["search_score"].as_f64().unwrap() > 0.0);

    let plan = store.last_plan().unwrap();
    assert!(plan.sql().contains("MATCH (`name`, `street_address`, `city`) AGAINST (? IN BOOLEAN MODE)"));
}

#[tokio::test]
async fn unknown_filters_are_ignored_and_fields_are_projected() {
    let store = MemoryStore::new();
    seed_site(&store, "One", 1, 37.0, -122.0);
    store.seed(
        Table::Site,
        json!({ "name": "Two", "owner_id": 1, "city": "Fremont" }),
    );
    let engine = engine(&store);

    let page = engine
        .list(&ListRequest::new(
            Table::Site,
            params(&[("city", "Fremont"), ("bogus", "1"), ("fields", "name")]),
        ))
        .await
        .unwrap();

    assert_eq!(page.data.len(), 1);
    let row = &page.data[0];
    let mut keys: Vec<&str> = row.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["created_at", "id", "name"]);
    assert!(!store.last_plan().unwrap().sql().contains("bogus"));
}

#[tokio::test]
async fn cursor_keeps_applying_filters() {
    let store = MemoryStore::new();
    for i in 0..6 {
        let city = if i % 2 == 0 { "Fremont" } else { "Campbell" };
        store.seed(
            Table::Site,
            json!({ "name": format!("S{i}"), "owner_id": 1, "city": city }),
        );
    }
    let engine = engine(&store);

    let pages = fetch_all(&engine, Table::Site, &[("city", "Fremont"), ("limit", "2")]).await;
    let rows: Vec<_> = pages.iter().flat_map(|p| p.data.iter()).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["city"] == "Fremont"));
}
