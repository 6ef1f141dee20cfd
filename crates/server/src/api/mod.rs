pub mod dlq;
pub mod health;
pub mod messages;
pub mod operations;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use provisor_worker::{IdempotencyGuard, MemoryChannel, WorkerMetrics};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// In-process inbound channel the worker consumes.
    pub inbound: Arc<MemoryChannel>,
    /// Idempotency guard shared with the worker.
    pub guard: Arc<IdempotencyGuard>,
    pub metrics: Arc<WorkerMetrics>,
}

/// Build the Axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/v1/messages", post(messages::enqueue))
        .route(
            "/v1/operations/{operation_id}",
            get(operations::get_operation).delete(operations::forget_operation),
        )
        .route("/v1/dlq", get(dlq::dlq_stats))
        .route("/v1/dlq/drain", post(dlq::dlq_drain))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
