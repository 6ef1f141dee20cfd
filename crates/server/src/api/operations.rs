use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use provisor_core::OperationId;
use provisor_worker::OperationRecord;

use super::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub operation_id: OperationId,
    #[serde(flatten)]
    pub record: OperationRecord,
}

/// `GET /v1/operations/{operation_id}` -- the idempotency record for an
/// operation.
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let operation_id = OperationId::new(operation_id);
    let record = state
        .guard
        .record(&operation_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("operation {operation_id}")))?;
    Ok(Json(OperationResponse {
        operation_id,
        record,
    }))
}

/// `DELETE /v1/operations/{operation_id}` -- drop the record so the next
/// delivery runs the handler again.
pub async fn forget_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let operation_id = OperationId::new(operation_id);
    if state.guard.forget(&operation_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("operation {operation_id}")))
    }
}
