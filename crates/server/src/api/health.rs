use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::warn;

use provisor_worker::MetricsSnapshot;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when the idempotency store is unreachable.
    pub status: &'static str,
    pub metrics: MetricsSnapshot,
}

/// `GET /health` -- returns service status together with a metrics snapshot.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = match state.guard.store().ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "health check: idempotency store unreachable");
            "degraded"
        }
    };
    Json(HealthResponse {
        status,
        metrics: state.metrics.snapshot(),
    })
}

/// `GET /metrics` -- returns worker counters only.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
