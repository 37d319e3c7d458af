//! Worker error types and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::debug;

use skirmish_core::GameId;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("game not found: {0}")]
    NotFound(GameId),

    #[error("game already exists: {0}")]
    AlreadyExists(GameId),

    #[error("game is full: {0}")]
    Full(GameId),

    #[error("game already started: {0}")]
    AlreadyStarted(GameId),

    #[error("only private lobbies can be reconfigured: {0}")]
    NotPrivate(GameId),

    #[error("invalid game id: {0}")]
    InvalidId(String),

    #[error("admin credentials required")]
    Unauthorized,

    #[error("invalid worker config: {0}")]
    Config(String),
}

impl WorkerError {
    pub fn status(&self) -> StatusCode {
        match self {
            WorkerError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkerError::AlreadyExists(_) | WorkerError::Full(_) | WorkerError::AlreadyStarted(_) => {
                StatusCode::CONFLICT
            }
            WorkerError::NotPrivate(_) | WorkerError::InvalidId(_) => StatusCode::BAD_REQUEST,
            WorkerError::Unauthorized => StatusCode::FORBIDDEN,
            WorkerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!(%status, error = %self, "worker request rejected");
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
