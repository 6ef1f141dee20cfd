use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use provisor_worker::{GuardError, WorkerError};

/// Errors that can occur when running the Provisor server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// The idempotency store could not serve the request.
    #[error("idempotency store error: {0}")]
    Guard(#[from] GuardError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The inbound channel no longer accepts messages.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) | Self::Guard(GuardError::Store(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Config(_) | Self::Io(_) | Self::Worker(_) | Self::Guard(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
