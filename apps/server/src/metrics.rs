//! Metrics collection for the catalog service
//!
//! Prometheus metrics registered in the default registry and exposed on
//! `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

lazy_static! {
    // HTTP Request Metrics

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "catalog_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    /// In-flight HTTP requests
    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "catalog_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    /// HTTP response size in bytes
    pub static ref HTTP_RESPONSE_SIZE_BYTES: HistogramVec = register_histogram_vec!(
        "catalog_http_response_size_bytes",
        "HTTP response size in bytes",
        &["method", "path", "status"],
        vec![100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0]
    )
    .expect("Failed to register HTTP_RESPONSE_SIZE_BYTES");

    // Catalog Operation Metrics

    /// Catalog operations by resource and operation
    pub static ref CATALOG_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_operations_total",
        "Total number of catalog operations",
        &["resource", "operation", "status"]
    )
    .expect("Failed to register CATALOG_OPERATIONS_TOTAL");

    // Query Engine Metrics

    /// List query duration by table
    pub static ref QUERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "catalog_query_duration_seconds",
        "List query duration in seconds",
        &["table"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .expect("Failed to register QUERY_DURATION_SECONDS");

    /// Rows returned per page
    pub static ref QUERY_PAGE_ROWS: HistogramVec = register_histogram_vec!(
        "catalog_query_page_rows",
        "Number of rows returned per page",
        &["table"],
        vec![0.0, 1.0, 10.0, 25.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .expect("Failed to register QUERY_PAGE_ROWS");

    /// List query failures
    pub static ref QUERY_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_query_errors_total",
        "Total number of failed list queries",
        &["table", "error_type"]
    )
    .expect("Failed to register QUERY_ERRORS_TOTAL");

    /// Geolocation lookups by outcome
    pub static ref GEO_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalog_geo_lookups_total",
        "Total number of IP geolocation lookups",
        &["outcome"]
    )
    .expect("Failed to register GEO_LOOKUPS_TOTAL");

    // Database Metrics

    /// Pool checkouts that timed out
    pub static ref DB_POOL_EXHAUSTED_TOTAL: IntCounter = register_int_counter!(
        "catalog_db_pool_exhausted_total",
        "Total number of connection checkouts that timed out"
    )
    .expect("Failed to register DB_POOL_EXHAUSTED_TOTAL");

    /// Open database connections
    pub static ref DB_CONNECTIONS_OPEN: IntGauge = register_int_gauge!(
        "catalog_db_connections_open",
        "Number of open database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_OPEN");

    /// Idle database connections
    pub static ref DB_CONNECTIONS_IDLE: IntGauge = register_int_gauge!(
        "catalog_db_connections_idle",
        "Number of idle database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_IDLE");
}

pub fn record_pool_exhausted() {
    DB_POOL_EXHAUSTED_TOTAL.inc();
}

pub fn record_query(table: &str, seconds: f64, rows: usize) {
    QUERY_DURATION_SECONDS
        .with_label_values(&[table])
        .observe(seconds);
    QUERY_PAGE_ROWS
        .with_label_values(&[table])
        .observe(rows as f64);
}

pub fn record_query_error(table: &str, err: &crate::Error) {
    let error_type = match err {
        crate::Error::ConnectionExhausted(_) => "pool_exhausted",
        crate::Error::Timeout(_) => "timeout",
        crate::Error::MalformedCursor(_) | crate::Error::Validation(_) => "invalid_request",
        _ => "database",
    };
    QUERY_ERRORS_TOTAL
        .with_label_values(&[table, error_type])
        .inc();
}

/// Helper to sanitize path for metrics labels (remove IDs, limit cardinality)
pub fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }

    let mut out = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        let is_collection = matches!(*segment, "api" | "sites" | "stations" | "evses");
        // `/api/stations/evses` is a collection, not a station id.
        if is_collection || i < 2 {
            out.push(*segment);
        } else {
            out.push("{id}");
        }
    }
    format!("/{}", out.join("/"))
}

/// Catalog resource addressed by a path (`sites`, `stations` or `evses`)
pub fn extract_resource(path: &str) -> Option<String> {
    let path = path.strip_prefix("/api/")?;
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["stations", "evses", ..] | ["stations", _, "evses", ..] => Some("evses".to_string()),
        [first, ..] if matches!(*first, "sites" | "stations") => Some(first.to_string()),
        _ => None,
    }
}

/// Catalog operation from path and method
pub fn extract_operation(method: &str, path: &str) -> Option<String> {
    let sanitized = sanitize_path(path);
    let is_item = sanitized.ends_with("{id}");

    let op = match (method, is_item) {
        ("GET", false) => "list",
        ("GET", true) => "read",
        ("POST", _) => "create",
        ("PATCH", true) | ("PUT", true) => "update",
        ("DELETE", true) => "delete",
        _ => return None,
    };
    Some(op.to_string())
}
