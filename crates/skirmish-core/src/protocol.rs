//! Out-of-band worker → master messages.
//!
//! Workers write one JSON object per line on stdout. Anything that does not
//! parse as a [`WorkerMessage`] is ordinary output and is ignored by the
//! supervisor.

use serde::{Deserialize, Serialize};

use crate::types::WorkerId;

/// Environment variable carrying a worker's logical ID.
pub const WORKER_ID_ENV: &str = "WORKER_ID";

/// Messages a worker sends to its supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The worker is listening and can accept games.
    WorkerReady { worker_id: WorkerId },
}

impl WorkerMessage {
    /// Encode as a single line (no trailing newline).
    pub fn to_line(&self) -> String {
        // Serializing a plain tagged enum cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a stdout line; `None` for non-protocol output.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}
