//! skirmish-core — types shared across the Skirmish fleet.
//!
//! - Game domain types in their JSON wire format
//! - `skirmish.toml` configuration
//! - The deterministic game → worker router
//! - Game ID generation
//! - The stdout handshake workers use to announce readiness

pub mod config;
pub mod error;
pub mod id;
pub mod protocol;
pub mod routing;
pub mod types;

pub use config::ServerConfig;
pub use error::{ConfigError, ConfigResult};
pub use id::{generate_game_id, is_valid_game_id};
pub use protocol::{WORKER_ID_ENV, WorkerMessage};
pub use routing::{WorkerRoute, WorkerRouter};
pub use types::*;
