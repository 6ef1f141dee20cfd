use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::info;

use provisor_worker::DeadLetterEntry;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct DlqStatsResponse {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct DlqDrainResponse {
    pub count: usize,
    pub entries: Vec<DeadLetterEntry>,
}

/// `GET /v1/dlq` -- number of dead-lettered messages.
pub async fn dlq_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(DlqStatsResponse {
        count: state.inbound.dead_letter_count(),
    })
}

/// `POST /v1/dlq/drain` -- remove and return every dead-lettered message.
pub async fn dlq_drain(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.inbound.drain_dead_letters();
    info!(count = entries.len(), "dead-letter queue drained");
    Json(DlqDrainResponse {
        count: entries.len(),
        entries,
    })
}
