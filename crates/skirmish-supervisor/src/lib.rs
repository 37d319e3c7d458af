//! skirmish-supervisor — worker process supervision for the Skirmish master.
//!
//! Spawns one OS process per worker slot, collects their readiness
//! handshakes into a fleet-wide barrier, and restarts any worker that exits
//! under the same logical ID.
//!
//! # Architecture
//!
//! ```text
//! WorkerSupervisor::run (single owner task)
//!   ├── Slot[0..N)
//!   │   ├── child process (WORKER_ID=i, stdout piped)
//!   │   ├── read_handshake task → Event::Ready
//!   │   ├── wait task → Event::Exited
//!   │   └── RestartTracker (backoff, crash-loop window)
//!   ├── ReadinessBarrier → FleetReady (fires once)
//!   └── SupervisorHandle (status snapshot, kill)
//! ```
//!
//! # Restarts
//!
//! The first crash after a quiet period restarts immediately. Repeated
//! crashes back off exponentially up to a cap, and a slot that crashes
//! `crash_loop_threshold` times inside one window raises an alert. The
//! fleet is always brought back to full size.

pub mod error;
pub mod readiness;
pub mod restart;
pub mod supervisor;

pub use error::{SupervisorError, SupervisorResult};
pub use readiness::{FleetReady, ReadinessBarrier};
pub use restart::{RestartDecision, RestartPolicy, RestartTracker};
pub use supervisor::{SupervisorHandle, WorkerCommand, WorkerState, WorkerStatus, WorkerSupervisor};
