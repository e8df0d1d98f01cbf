//! Per-request span, request id and trace id headers

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use opentelemetry::trace::TraceContextExt;
use std::time::Instant;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

/// Opens the root span for each HTTP request.
///
/// - Generates a server request id, returned as `X-Request-Id`
/// - Returns the trace id as `X-Trace-Id`
/// - Echoes a differing client `X-Request-Id` as `X-Correlation-Id`
/// - Records the catalog resource and operation on the span
#[tracing::instrument(
    name = "http_request",
    skip_all,
    fields(
        http.method = %req.method(),
        http.route = %crate::metrics::sanitize_path(req.uri().path()),
        http.scheme = %req.uri().scheme_str().unwrap_or("http"),
        otel.kind = "server",
        http.response.status_code = tracing::field::Empty,
        catalog.resource = tracing::field::Empty,
        catalog.operation = tracing::field::Empty,
        request_id = tracing::field::Empty,
        user_id = tracing::field::Empty,
    )
)]
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let current_span = Span::current();
    let start = Instant::now();

    let client_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let server_id = Uuid::new_v4().to_string();
    current_span.record("request_id", &server_id);

    let path = req.uri().path().to_string();
    let method = req.method().clone();
    if let Some(resource) = crate::metrics::extract_resource(&path) {
        current_span.record("catalog.resource", &resource);
    }
    if let Some(operation) = crate::metrics::extract_operation(method.as_str(), &path) {
        current_span.record("catalog.operation", &operation);
    }

    tracing::debug!(
        method = %method,
        path = %path,
        request_id = %server_id,
        "Incoming request"
    );

    let mut response = next.run(req).await;

    let status = response.status();
    let duration = start.elapsed();
    current_span.record("http.response.status_code", status.as_u16());

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&server_id) {
        headers.insert("x-request-id", value);
    }

    let trace_id = current_span
        .context()
        .span()
        .span_context()
        .trace_id()
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        headers.insert("x-trace-id", value);
    }

    if let Some(client_id) = client_id {
        if client_id != server_id {
            if let Ok(value) = HeaderValue::from_str(&client_id) {
                headers.insert("x-correlation-id", value);
            }
        }
    }

    response
}
