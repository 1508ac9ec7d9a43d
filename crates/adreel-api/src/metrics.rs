//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "adreel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "adreel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "adreel_http_requests_in_flight";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static PROJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/projects/[A-Za-z0-9_:-]+").unwrap());
static RENDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/renders/[A-Za-z0-9_:-]+").unwrap());
static SCENE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/scenes/[A-Za-z0-9_:-]+").unwrap());
static CHECKPOINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/checkpoints/[A-Za-z0-9_:-]+").unwrap());

/// Sanitize path for metrics labels so ids do not blow up cardinality.
fn sanitize_path(path: &str) -> String {
    let path = PROJECT_RE.replace_all(path, "/projects/:project_id");
    let path = RENDER_RE.replace_all(&path, "/renders/:render_id");
    let path = SCENE_RE.replace_all(&path, "/scenes/:scene_id");
    let path = CHECKPOINT_RE.replace_all(&path, "/checkpoints/:checkpoint_id");
    let path = UUID_RE.replace_all(&path, ":id");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/projects/0a1b2c3d/scenes/scene-2/regenerate"),
            "/api/projects/:project_id/scenes/:scene_id/regenerate"
        );
        assert_eq!(
            sanitize_path("/api/renders/550e8400-e29b-41d4-a716-446655440000/cancel"),
            "/api/renders/:render_id/cancel"
        );
        assert_eq!(
            sanitize_path("/api/projects/p-1/checkpoints/cp-9/restore"),
            "/api/projects/:project_id/checkpoints/:checkpoint_id/restore"
        );
    }
}
