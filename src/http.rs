use crate::metrics::Metrics;
use crate::monitor::{Monitor, Phase};
use crate::reading::{format_timestamp, Reading};
use crate::thresholds::Thresholds;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub monitor: Arc<Monitor>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiStatus {
    pub phase: Phase,
    pub started_at: Option<String>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub thresholds: Thresholds,
    pub latest: Option<Reading>,
}

pub fn build_router(metrics: Arc<Metrics>, monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/status", get(status_handler))
        .with_state(HttpAppState { metrics, monitor })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn status_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let monitor = &state.monitor;
    let (history_len, history_capacity, latest) = {
        let history = monitor.history();
        let guard = history.read().await;
        (guard.len(), guard.capacity(), guard.latest().cloned())
    };

    Json(ApiStatus {
        phase: monitor.phase(),
        started_at: monitor.started_at_ms().map(format_timestamp),
        history_len,
        history_capacity,
        thresholds: monitor.thresholds().await,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertDispatcher;
    use crate::collectors::fake::FakeSource;
    use crate::history::HistoryBuffer;
    use crate::monitor::LoopSettings;
    use crate::sampler::Sampler;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn app_parts() -> (Arc<Metrics>, Arc<Monitor>, Sampler) {
        let metrics = Metrics::new().expect("metrics init");
        let history = Arc::new(RwLock::new(HistoryBuffer::new(4)));
        let sampler = Sampler::new(FakeSource::default(), history.clone(), Duration::from_secs(1));
        let monitor_sampler =
            Sampler::new(FakeSource::default(), history, Duration::from_secs(1));
        let monitor = Arc::new(Monitor::new(
            monitor_sampler,
            Thresholds::default(),
            AlertDispatcher::new(Duration::from_secs(1)),
            metrics.clone(),
            LoopSettings {
                interval: Duration::from_secs(60),
                failure_backoff: Duration::from_secs(1),
                stop_timeout: Duration::from_secs(1),
            },
        ));
        (metrics, monitor, sampler)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (metrics, monitor, _) = app_parts();
        let (status, body) = get_body(build_router(metrics, monitor), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn metrics_lists_monitor_series() {
        let (metrics, monitor, _) = app_parts();
        metrics.inc_tick_failure("timeout");
        let (status, body) = get_body(build_router(metrics, monitor), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("resmon_tick_failures_total"));
        assert!(body.contains("resmon_history_len"));
    }

    #[tokio::test]
    async fn status_reports_phase_and_latest_reading() {
        let (metrics, monitor, sampler) = app_parts();
        let (_, body) = get_body(build_router(metrics.clone(), monitor.clone()), "/api/status").await;
        let value: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["phase"], "Idle");
        assert_eq!(value["history_len"], 0);
        assert!(value["latest"].is_null());

        sampler.tick().await.expect("tick");
        let (status, body) = get_body(build_router(metrics, monitor), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["history_len"], 1);
        assert_eq!(value["history_capacity"], 4);
        assert_eq!(value["thresholds"]["memory"], 75.0);
        assert!(value["latest"]["cpu"]["total_percent"].is_number());
    }
}
