//! Demo routes.
//!
//! `/ping` answers with the serving process id, which makes it easy to
//! watch requests move from one generation to the next.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Header carrying the pid of the process that served the request.
pub const SERVED_BY: HeaderName = HeaderName::from_static("x-served-by");

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest `/sleep` the demo will honour.
pub const MAX_SLEEP: Duration = Duration::from_secs(10);

/// Build the demo router. `/metrics` is mounted when a handle is given.
#[allow(deprecated)]
pub fn demo_router(metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/ping", get(ping))
        .route("/sleep/{millis}", get(sleep));

    if let Some(handle) = metrics {
        router = router.route("/metrics", get(render_metrics).with_state(handle));
    }

    router
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

async fn ping() -> Response {
    served_by("pong\n")
}

/// Hold the request open for `millis`, then answer like `/ping`.
async fn sleep(Path(millis): Path<u64>) -> Response {
    let delay = Duration::from_millis(millis);
    if delay > MAX_SLEEP {
        return (StatusCode::BAD_REQUEST, "sleep too long\n").into_response();
    }
    tokio::time::sleep(delay).await;
    served_by("pong\n")
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

fn served_by(body: &'static str) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    response
        .headers_mut()
        .insert(SERVED_BY, HeaderValue::from(std::process::id()));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(path: &str) -> Response {
        demo_router(None)
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ping_reports_pid() {
        let response = call("/ping").await;
        assert_eq!(response.status(), StatusCode::OK);

        let pid = response.headers()[SERVED_BY].to_str().unwrap().to_string();
        assert_eq!(pid, std::process::id().to_string());

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"pong\n");
    }

    #[tokio::test]
    async fn overlong_sleep_is_rejected() {
        let response = call("/sleep/60000").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_absent_without_handle() {
        let response = call("/metrics").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
