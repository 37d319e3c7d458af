//! Lobby subsystem error types.

use thiserror::Error;

/// Errors from talking to workers or configuring the rotation.
#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("connection to worker {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("request to {uri} timed out")]
    Timeout { uri: String },

    #[error("worker answered {status} for {uri}")]
    Status { uri: String, status: u16 },

    #[error("game not found on worker: {0}")]
    NotFound(String),

    #[error("malformed worker response from {uri}: {reason}")]
    Malformed { uri: String, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid map rotation: {0}")]
    InvalidRotation(String),
}

impl LobbyError {
    /// Whether the worker gave a definitive "this game does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, LobbyError::NotFound(_))
    }
}

pub type LobbyResult<T> = Result<T, LobbyError>;
