//! Master mode: supervise the workers, keep a public lobby open, and serve
//! the client API.
//!
//! Startup order:
//! 1. Spawn the worker fleet under the supervisor
//! 2. Bind the client API and metrics listeners
//! 3. Once every worker has signalled ready, start the lobby loop
//! 4. On Ctrl-C, stop the loop, drain the listeners, and kill the workers

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use skirmish_api::{ApiState, ClientRateLimiter, build_router, metrics_router};
use skirmish_core::ServerConfig;
use skirmish_lobby::{LobbyScheduler, PublicLobbyRegistry, WorkerClient, run_lobby_loop};
use skirmish_metrics::FleetMetrics;
use skirmish_supervisor::{RestartPolicy, WorkerCommand, WorkerSupervisor};

const LIMITER_HOUSEKEEPING: Duration = Duration::from_secs(60);

/// Run the master until Ctrl-C.
pub async fn run_master(config: ServerConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    info!(
        env = %config.env,
        workers = config.num_workers,
        port = config.master.port,
        "Skirmish master starting"
    );

    let metrics = FleetMetrics::new(config.num_workers);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Worker fleet ───────────────────────────────────────────
    let command = worker_command(&config, config_path.as_deref())?;
    let policy = RestartPolicy::from_config(&config)?;
    let (supervisor, fleet, mut fleet_ready) =
        WorkerSupervisor::new(command, config.num_workers, policy, metrics.clone());
    let supervisor_handle = tokio::spawn(supervisor.run(shutdown_rx.clone()));

    // ── Lobby loop ─────────────────────────────────────────────
    let (registry, lobbies) = PublicLobbyRegistry::new(config.prune_threshold()?);
    let scheduler = LobbyScheduler::from_config(&config)?;
    let client = WorkerClient::from_config(&config)?;
    let poll_interval = config.poll_interval()?;

    let lobby_metrics = metrics.clone();
    let limiter_metrics = metrics.clone();
    let mut lobby_shutdown = shutdown_rx.clone();
    let lobby_handle = tokio::spawn(async move {
        let ready = tokio::select! {
            ready = fleet_ready.wait() => ready,
            _ = lobby_shutdown.changed() => false,
        };
        if !ready {
            debug!("fleet never became ready; lobby loop not started");
            return;
        }
        for status in fleet.status().await {
            debug!(worker_id = status.worker_id, pid = ?status.pid, "fleet member");
        }
        run_lobby_loop(
            registry,
            scheduler,
            client,
            poll_interval,
            lobby_metrics,
            lobby_shutdown,
        )
        .await;
    });

    // ── Metrics listener ───────────────────────────────────────
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.master.metrics_port));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("binding metrics listener on {metrics_addr}"))?;
    info!(addr = %metrics_addr, "metrics server starting");
    let mut metrics_shutdown = shutdown_rx.clone();
    let metrics_handle = tokio::spawn(async move {
        let server = axum::serve(metrics_listener, metrics_router(metrics))
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.wait_for(|stop| *stop).await;
            });
        if let Err(e) = server.await {
            warn!(error = %e, "metrics server failed");
        }
    });

    // ── Rate limiter ───────────────────────────────────────────
    let limiter = ClientRateLimiter::new(
        config.rate_limit.max_requests,
        config.rate_limit_window()?,
        config.master.trust_proxy_hops,
        limiter_metrics,
    );
    let housekeeping_handle = limiter.clone().map(|limiter| {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_HOUSEKEEPING);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        limiter.housekeep();
                        debug!(clients = limiter.tracked_clients(), "rate limiter housekeeping");
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    });
    if limiter.is_none() {
        warn!("rate limiting disabled");
    }

    // ── Client API ─────────────────────────────────────────────
    let state = ApiState {
        game_env: Arc::from(config.env.as_str()),
        lobbies,
    };
    let router = build_router(state, Path::new(&config.master.static_dir), limiter);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.master.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding client API on {addr}"))?;
    info!(%addr, static_dir = %config.master.static_dir, "API server starting");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    // ── Drain ──────────────────────────────────────────────────
    let _ = lobby_handle.await;
    let _ = metrics_handle.await;
    if let Some(handle) = housekeeping_handle {
        let _ = handle.await;
    }
    let _ = supervisor_handle.await;

    info!("Skirmish master stopped");
    Ok(())
}

/// Re-invoke this binary in worker mode with the master's effective
/// settings.
fn worker_command(config: &ServerConfig, config_path: Option<&Path>) -> anyhow::Result<WorkerCommand> {
    let exe = std::env::current_exe().context("locating the skirmishd executable")?;
    let mut command = WorkerCommand::new(exe)
        .arg("worker")
        .arg("--base-port")
        .arg(config.workers.base_port.to_string());
    if let Some(path) = config_path {
        command = command.arg("--config").arg(path.display().to_string());
    }
    Ok(command
        .env("GAME_ENV", config.env.clone())
        .env("ADMIN_TOKEN", config.workers.admin_token.clone()))
}
