//! skirmish-lobby — public lobby management for the Skirmish master.
//!
//! Keeps a fleet-wide listing of open public lobbies fresh and makes sure
//! one is always open, drawing its map from a constrained rotation.
//!
//! # Architecture
//!
//! ```text
//! run_lobby_loop (single task, one tick per poll interval)
//!   ├── PublicLobbyRegistry::tick()
//!   │   ├── JoinSet fan-out: WorkerApi::fetch_game() per tracked lobby
//!   │   ├── prune: started / full / missing
//!   │   └── publish snapshot → watch channel → PublicLobbies (HTTP readers)
//!   └── LobbyScheduler::on_tick(tracked)
//!       ├── MapRotationPlanner::next_map()
//!       └── WorkerApi::create_game() → registry.track()
//! ```
//!
//! # Failure handling
//!
//! A fetch that times out or fails to connect never removes a lobby on its
//! own; a `404` from the owning worker does. A failed creation restores the
//! drawn map and is retried after `retry_interval`.

pub mod client;
pub mod error;
pub mod playlist;
pub mod poller;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use client::{WorkerApi, WorkerClient};
pub use error::{LobbyError, LobbyResult};
pub use playlist::{DEFAULT_FREQUENCIES, MapRotationPlanner};
pub use poller::{run_lobby_loop, run_tick};
pub use registry::{PruneReason, PublicLobbies, PublicLobbyList, PublicLobbyRecord, PublicLobbyRegistry, TickReport};
pub use scheduler::{LobbyScheduler, ScheduleOutcome, ScheduleState};
