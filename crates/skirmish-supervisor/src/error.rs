//! Supervisor error types.

use skirmish_core::WorkerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker {worker_id}: {source}")]
    Spawn {
        worker_id: WorkerId,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown worker: {0}")]
    UnknownWorker(WorkerId),

    #[error("worker {0} has no running process")]
    NotRunning(WorkerId),

    #[error("supervisor is not running")]
    Stopped,

    #[error("invalid supervisor config: {0}")]
    Config(String),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
