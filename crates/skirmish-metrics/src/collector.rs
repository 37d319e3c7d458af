//! Fleet metrics collector.
//!
//! Lock-free: every counter is an atomic so the supervisor, the lobby loop,
//! and HTTP middleware can record without coordinating.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use skirmish_core::WorkerId;

/// Per-worker-slot counters.
#[derive(Default)]
struct WorkerCounters {
    restarts: AtomicU64,
    crash_loops: AtomicU64,
}

#[derive(Default)]
struct Inner {
    workers: Vec<WorkerCounters>,
    workers_ready: AtomicU64,
    ticks: AtomicU64,
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
    lobbies_tracked: AtomicU64,
    pruned_started: AtomicU64,
    pruned_full: AtomicU64,
    pruned_missing: AtomicU64,
    lobbies_created: AtomicU64,
    schedule_failures: AtomicU64,
    rate_limited: AtomicU64,
}

/// Shared handle to the fleet's counters. Cloning is cheap.
#[derive(Clone)]
pub struct FleetMetrics {
    inner: Arc<Inner>,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetSnapshot {
    /// `(worker_id, restarts, crash_loops)` per slot.
    pub workers: Vec<(WorkerId, u64, u64)>,
    pub workers_ready: u64,
    pub ticks: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub lobbies_tracked: u64,
    pub pruned_started: u64,
    pub pruned_full: u64,
    pub pruned_missing: u64,
    pub lobbies_created: u64,
    pub schedule_failures: u64,
    pub rate_limited: u64,
}

impl FleetMetrics {
    /// Create counters for a fleet of `num_workers` slots.
    pub fn new(num_workers: u32) -> Self {
        let workers = (0..num_workers).map(|_| WorkerCounters::default()).collect();
        Self {
            inner: Arc::new(Inner {
                workers,
                ..Inner::default()
            }),
        }
    }

    /// A worker slot was respawned after its process exited.
    pub fn record_worker_restart(&self, worker_id: WorkerId) {
        if let Some(w) = self.inner.workers.get(worker_id as usize) {
            w.restarts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A worker slot crossed the crash-loop threshold.
    pub fn record_crash_loop(&self, worker_id: WorkerId) {
        if let Some(w) = self.inner.workers.get(worker_id as usize) {
            w.crash_loops.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_workers_ready(&self, ready: u32) {
        self.inner.workers_ready.store(ready as u64, Ordering::Relaxed);
    }

    /// Record the outcome of one polling tick.
    pub fn record_tick(
        &self,
        polled_ok: u64,
        failed: u64,
        pruned: (u64, u64, u64),
        tracked: usize,
    ) {
        let i = &self.inner;
        i.ticks.fetch_add(1, Ordering::Relaxed);
        i.polls_ok.fetch_add(polled_ok, Ordering::Relaxed);
        i.polls_failed.fetch_add(failed, Ordering::Relaxed);
        i.pruned_started.fetch_add(pruned.0, Ordering::Relaxed);
        i.pruned_full.fetch_add(pruned.1, Ordering::Relaxed);
        i.pruned_missing.fetch_add(pruned.2, Ordering::Relaxed);
        i.lobbies_tracked.store(tracked as u64, Ordering::Relaxed);
    }

    pub fn record_lobby_created(&self) {
        self.inner.lobbies_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schedule_failure(&self) {
        self.inner.schedule_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A client request was rejected by the rate limiter.
    pub fn record_rate_limited(&self) {
        self.inner.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> FleetSnapshot {
        let i = &self.inner;
        let workers = i
            .workers
            .iter()
            .enumerate()
            .map(|(id, w)| {
                (
                    id as WorkerId,
                    w.restarts.load(Ordering::Relaxed),
                    w.crash_loops.load(Ordering::Relaxed),
                )
            })
            .collect();

        let snapshot = FleetSnapshot {
            workers,
            workers_ready: i.workers_ready.load(Ordering::Relaxed),
            ticks: i.ticks.load(Ordering::Relaxed),
            polls_ok: i.polls_ok.load(Ordering::Relaxed),
            polls_failed: i.polls_failed.load(Ordering::Relaxed),
            lobbies_tracked: i.lobbies_tracked.load(Ordering::Relaxed),
            pruned_started: i.pruned_started.load(Ordering::Relaxed),
            pruned_full: i.pruned_full.load(Ordering::Relaxed),
            pruned_missing: i.pruned_missing.load(Ordering::Relaxed),
            lobbies_created: i.lobbies_created.load(Ordering::Relaxed),
            schedule_failures: i.schedule_failures.load(Ordering::Relaxed),
            rate_limited: i.rate_limited.load(Ordering::Relaxed),
        };
        debug!(ticks = snapshot.ticks, "metrics snapshot taken");
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let m = FleetMetrics::new(3);
        let s = m.snapshot();
        assert_eq!(s.workers, vec![(0, 0, 0), (1, 0, 0), (2, 0, 0)]);
        assert_eq!(s.ticks, 0);
        assert_eq!(s.lobbies_created, 0);
    }

    #[test]
    fn worker_counters_are_per_slot() {
        let m = FleetMetrics::new(2);
        m.record_worker_restart(1);
        m.record_worker_restart(1);
        m.record_crash_loop(1);
        m.record_worker_restart(0);
        // Unknown slot is ignored.
        m.record_worker_restart(9);

        let s = m.snapshot();
        assert_eq!(s.workers, vec![(0, 1, 0), (1, 2, 1)]);
    }

    #[test]
    fn tick_accumulates_and_tracked_is_a_gauge() {
        let m = FleetMetrics::new(1);
        m.record_tick(3, 1, (1, 0, 0), 2);
        m.record_tick(2, 0, (0, 1, 1), 0);

        let s = m.snapshot();
        assert_eq!(s.ticks, 2);
        assert_eq!(s.polls_ok, 5);
        assert_eq!(s.polls_failed, 1);
        assert_eq!((s.pruned_started, s.pruned_full, s.pruned_missing), (1, 1, 1));
        assert_eq!(s.lobbies_tracked, 0);
    }

    #[test]
    fn clones_share_counters() {
        let m = FleetMetrics::new(1);
        let other = m.clone();
        other.record_lobby_created();
        other.record_schedule_failure();
        other.record_rate_limited();
        m.set_workers_ready(1);

        let s = m.snapshot();
        assert_eq!(s.lobbies_created, 1);
        assert_eq!(s.schedule_failures, 1);
        assert_eq!(s.rate_limited, 1);
        assert_eq!(s.workers_ready, 1);
    }
}
