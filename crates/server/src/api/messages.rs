use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::debug;

use provisor_core::MessageId;
use provisor_worker::ChannelError;

use super::AppState;
use crate::error::ServerError;

/// Optional header carrying a caller-chosen message id.
pub const MESSAGE_ID_HEADER: &str = "x-message-id";

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub message_id: MessageId,
}

/// `POST /v1/messages` -- put a raw action body on the inbound channel.
///
/// The body is not validated here; undecodable messages take the worker's
/// retry and dead-letter path like any other delivery.
pub async fn enqueue(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("message body is empty".into()));
    }

    let message_id = match headers.get(MESSAGE_ID_HEADER) {
        Some(value) => {
            let id = value
                .to_str()
                .map_err(|_| ServerError::BadRequest(format!("{MESSAGE_ID_HEADER} is not ASCII")))?
                .trim();
            if id.is_empty() {
                return Err(ServerError::BadRequest(format!("{MESSAGE_ID_HEADER} is blank")));
            }
            state.inbound.send_with_id(id, body)
        }
        None => state.inbound.send(body),
    }
    .map_err(|e| match e {
        ChannelError::Closed => ServerError::Unavailable("inbound channel is closed".into()),
        other => ServerError::Unavailable(other.to_string()),
    })?;

    debug!(message_id = %message_id, "message enqueued");
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { message_id })))
}
