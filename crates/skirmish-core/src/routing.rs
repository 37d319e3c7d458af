//! Game → worker routing.
//!
//! A game's owning worker is a pure function of its ID and the fleet size,
//! so routing survives worker restarts as long as the logical IDs do.

use serde::{Deserialize, Serialize};

use crate::types::WorkerId;

/// Where a game lives: worker slot, TCP port and URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRoute {
    pub worker_id: WorkerId,
    pub port: u16,
    /// Path segment used by the reverse proxy, e.g. `w3`.
    pub path: String,
}

impl WorkerRoute {
    /// `host:port` of the owning worker.
    pub fn address(&self, host: &str) -> String {
        format!("{host}:{}", self.port)
    }
}

/// Deterministic router over a fixed-size worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerRouter {
    num_workers: u32,
    base_port: u16,
}

impl WorkerRouter {
    /// `num_workers` is clamped to at least one.
    pub fn new(num_workers: u32, base_port: u16) -> Self {
        Self {
            num_workers: num_workers.max(1),
            base_port,
        }
    }

    pub fn num_workers(&self) -> u32 {
        self.num_workers
    }

    /// Index of the worker that owns `game_id`.
    pub fn worker_index(&self, game_id: &str) -> WorkerId {
        simple_hash(game_id) % self.num_workers
    }

    /// Port a worker slot listens on.
    pub fn port_for(&self, worker_id: WorkerId) -> u16 {
        self.base_port.wrapping_add(worker_id as u16)
    }

    /// Full route for `game_id`.
    pub fn route(&self, game_id: &str) -> WorkerRoute {
        let worker_id = self.worker_index(game_id);
        WorkerRoute {
            worker_id,
            port: self.port_for(worker_id),
            path: path_for(worker_id),
        }
    }
}

/// URL path segment for a worker slot.
pub fn path_for(worker_id: WorkerId) -> String {
    format!("w{worker_id}")
}

/// 32-bit string hash (`h = h * 31 + c` over UTF-16 code units, wrapping),
/// returned as its absolute value so it is stable across every client that
/// computes routes.
pub fn simple_hash(s: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in s.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    hash.unsigned_abs()
}
