//! Built-in endpoints and canned responses
//!
//! Functions return `EndpointResponse` instead of writing to the session so
//! they stay testable; the caller writes them out.

use std::time::Instant;

use crate::error::ImagistError;
use crate::metrics::Metrics;

pub const HEALTH_PATH: &str = "/health";
pub const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl EndpointResponse {
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    pub fn prometheus(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; version=0.0.4",
            body,
        }
    }

    /// JSON error body for a failed transform request
    pub fn from_error(err: &ImagistError) -> Self {
        Self::json(err.to_http_status(), err.to_json_body())
    }
}

/// `/health`: status, uptime and version
pub fn handle_health(start_time: Instant) -> EndpointResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION")
    })
    .to_string();

    EndpointResponse::json(200, body)
}

/// `/metrics`: Prometheus text format
pub fn handle_metrics(metrics: &Metrics) -> EndpointResponse {
    EndpointResponse::prometheus(metrics.export_prometheus())
}

pub fn method_not_allowed(method: &str) -> EndpointResponse {
    let body = serde_json::json!({
        "error": "method_not_allowed",
        "message": format!("Method {} is not allowed; use GET or HEAD", method),
        "status": 405
    })
    .to_string();

    EndpointResponse::json(405, body)
}
