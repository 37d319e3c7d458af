//! skirmish-worker — reference game worker for the Skirmish fleet.
//!
//! Hosts lobby sessions in memory and speaks the worker HTTP surface the
//! master polls. It does not simulate games; a game "starts" when its
//! countdown runs out or its host starts it.
//!
//! # API Routes
//!
//! Every route is served both bare and under the worker's `/w{id}` prefix.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/create_game/{id}` | Create a game (public games need the admin header) |
//! | GET | `/api/game/{id}` | Game state |
//! | PUT | `/api/game/{id}` | Reconfigure a private lobby |
//! | POST | `/api/start_game/{id}` | Start a game now |
//! | POST | `/api/join/{id}` | Join a lobby |
//!
//! After binding its listener the worker writes a `worker_ready` line to
//! stdout for the supervisor; logs go to stderr.

pub mod error;
pub mod handlers;
pub mod store;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderName;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use skirmish_core::routing::path_for;
use skirmish_core::{ServerConfig, WorkerId, WorkerMessage, epoch_millis};

pub use error::{WorkerError, WorkerResult};
pub use store::{GameSession, GameStore};

/// Shared state for worker handlers.
#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: WorkerId,
    pub store: GameStore,
    pub admin_header: HeaderName,
    pub admin_token: Arc<str>,
}

impl WorkerState {
    pub fn new(worker_id: WorkerId, store: GameStore, admin_header: &str, admin_token: &str) -> WorkerResult<Self> {
        let admin_header = HeaderName::from_bytes(admin_header.as_bytes())
            .map_err(|e| WorkerError::Config(format!("admin header: {e}")))?;
        Ok(Self {
            worker_id,
            store,
            admin_header,
            admin_token: Arc::from(admin_token),
        })
    }

    pub fn from_config(config: &ServerConfig, worker_id: WorkerId) -> WorkerResult<Self> {
        let invalid = |e: skirmish_core::ConfigError| WorkerError::Config(e.to_string());
        let store = GameStore::new(
            config.lobby_lifetime().map_err(invalid)?,
            config.game_retention().map_err(invalid)?,
        );
        Self::new(
            worker_id,
            store,
            &config.workers.admin_header,
            &config.workers.admin_token,
        )
    }
}

/// Build the worker router, mounted bare and under `/w{worker_id}`.
pub fn build_router(state: WorkerState) -> Router {
    let prefix = format!("/{}", path_for(state.worker_id));

    let api: Router = Router::new()
        .route(
            "/api/game/{id}",
            get(handlers::get_game).put(handlers::update_game),
        )
        .route("/api/create_game/{id}", post(handlers::create_game))
        .route("/api/start_game/{id}", post(handlers::start_game))
        .route("/api/join/{id}", post(handlers::join_game))
        .with_state(state);

    Router::new().nest(&prefix, api.clone()).merge(api)
}

/// Tell the supervisor this worker is accepting games.
pub fn announce_ready(worker_id: WorkerId) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", WorkerMessage::WorkerReady { worker_id }.to_line())?;
    stdout.flush()
}

/// Periodically drop expired games until `shutdown` flips to `true`.
pub async fn run_reaper(store: GameStore, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.reap(epoch_millis()).await;
            }
            _ = shutdown.changed() => {
                debug!("reaper shutting down");
                break;
            }
        }
    }
}

/// Serve the worker API on `listener` until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    state: WorkerState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let worker_id = state.worker_id;
    let addr = listener.local_addr()?;
    info!(worker_id, %addr, "worker API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
