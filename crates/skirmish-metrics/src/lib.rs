//! skirmish-metrics — observability for the Skirmish master.
//!
//! Counts worker restarts, lobby polling outcomes, and scheduling results,
//! and renders them in the Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! FleetMetrics (Arc, cloned into every subsystem)
//!   ├── record_*() / set_*() ← supervisor, lobby loop, rate limiter
//!   └── snapshot() → FleetSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{FleetMetrics, FleetSnapshot};
pub use prometheus::render_prometheus;
