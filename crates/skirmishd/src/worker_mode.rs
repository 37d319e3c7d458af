//! Worker mode: host games on `base_port + worker_id`.
//!
//! The worker binds its port first and only then writes the readiness line,
//! so the master never routes to a worker that cannot accept connections.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use skirmish_core::{ServerConfig, WorkerId};
use skirmish_worker::WorkerState;

const REAP_EVERY: Duration = Duration::from_secs(30);

/// Run one worker until Ctrl-C or until the master kills it.
pub async fn run_worker(config: ServerConfig, worker_id: WorkerId) -> anyhow::Result<()> {
    let port = config.router().port_for(worker_id);
    let addr = format!("{}:{}", config.workers.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("worker {worker_id}: binding {addr}"))?;

    let state = WorkerState::from_config(&config, worker_id)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper = tokio::spawn(skirmish_worker::run_reaper(
        state.store.clone(),
        REAP_EVERY,
        shutdown_rx.clone(),
    ));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!(worker_id, "shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Keep the sender alive; dropping it would read as shutdown.
                warn!(worker_id, error = %e, "no CTRL+C handler; running until killed");
                std::future::pending::<()>().await;
            }
        }
    });

    skirmish_worker::announce_ready(worker_id).context("writing readiness signal")?;
    info!(worker_id, %addr, env = %config.env, "worker ready");

    skirmish_worker::serve(listener, state, shutdown_rx).await?;
    let _ = reaper.await;

    info!(worker_id, "worker stopped");
    Ok(())
}
