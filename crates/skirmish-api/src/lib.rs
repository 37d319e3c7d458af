//! skirmish-api — HTTP facade of the Skirmish master.
//!
//! Serves the read-only endpoints browser clients poll, the SPA entry
//! document for every other path, and a separate Prometheus router for the
//! metrics listener.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/env` | Deployment environment name |
//! | GET | `/api/public_lobbies` | Latest public lobby snapshot |
//! | GET | `*` | SPA entry document (`index.html`, no-cache) |
//! | GET | `/metrics` | Prometheus exposition (metrics listener only) |
//!
//! Everything on the client router passes through the per-IP rate limiter
//! when one is configured.

pub mod handlers;
pub mod rate_limit;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;

use skirmish_lobby::PublicLobbies;
use skirmish_metrics::FleetMetrics;

pub use rate_limit::{ClientRateLimiter, client_ip};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub game_env: Arc<str>,
    pub lobbies: PublicLobbies,
}

/// Location of the SPA entry document.
#[derive(Clone)]
pub struct SpaState {
    pub index: Arc<PathBuf>,
}

/// Build the client-facing router.
pub fn build_router(
    state: ApiState,
    static_dir: &Path,
    limiter: Option<ClientRateLimiter>,
) -> Router {
    let spa = SpaState {
        index: Arc::new(static_dir.join("index.html")),
    };

    let api_routes = Router::new()
        .route("/env", get(handlers::get_env))
        .route("/public_lobbies", get(handlers::get_public_lobbies))
        .with_state(state);

    let router = Router::new()
        .nest("/api", api_routes)
        .fallback_service(get(handlers::spa_index).with_state(spa));

    match limiter {
        Some(limiter) => {
            router.layer(middleware::from_fn_with_state(limiter, rate_limit::rate_limit))
        }
        None => router,
    }
}

/// Build the router for the metrics listener.
pub fn metrics_router(metrics: FleetMetrics) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(metrics)
}
