//! Fleet readiness barrier.
//!
//! Counts distinct workers that announced readiness and fires once when all
//! of them have. Later restarts do not re-arm it.

use std::collections::HashSet;

use tokio::sync::watch;

use skirmish_core::WorkerId;

/// Write side, owned by the supervisor.
#[derive(Debug)]
pub struct ReadinessBarrier {
    expected: u32,
    ready: HashSet<WorkerId>,
    tx: watch::Sender<bool>,
}

/// Awaitable "every worker is ready" signal. Cloneable.
#[derive(Debug, Clone)]
pub struct FleetReady {
    rx: watch::Receiver<bool>,
}

impl ReadinessBarrier {
    pub fn new(expected: u32) -> (Self, FleetReady) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                expected,
                ready: HashSet::new(),
                tx,
            },
            FleetReady { rx },
        )
    }

    /// Record a readiness signal. Returns `true` only for the signal that
    /// completes the fleet.
    pub fn mark_ready(&mut self, worker_id: WorkerId) -> bool {
        if worker_id >= self.expected || self.is_complete() {
            return false;
        }
        self.ready.insert(worker_id);
        if self.ready.len() as u32 == self.expected {
            self.tx.send_replace(true);
            return true;
        }
        false
    }

    pub fn ready_count(&self) -> u32 {
        self.ready.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        *self.tx.borrow()
    }
}

impl FleetReady {
    /// Resolve once every worker has been ready at least once.
    ///
    /// Returns `false` if the supervisor went away before that happened.
    pub async fn wait(&mut self) -> bool {
        self.rx.wait_for(|ready| *ready).await.is_ok()
    }

    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }
}
