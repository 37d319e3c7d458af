//! The lobby loop: one task that owns the registry and the scheduler.
//!
//! Ticks are strictly sequential. A tick that overruns the poll interval
//! delays the next one instead of stacking another on top.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use skirmish_metrics::FleetMetrics;

use crate::client::WorkerApi;
use crate::registry::{PublicLobbyRegistry, TickReport};
use crate::scheduler::{LobbyScheduler, ScheduleOutcome};

/// Refresh the registry, then let the scheduler react to the new count.
pub async fn run_tick<W: WorkerApi>(
    registry: &mut PublicLobbyRegistry,
    scheduler: &mut LobbyScheduler,
    api: &W,
    metrics: &FleetMetrics,
    now: Instant,
) -> (TickReport, ScheduleOutcome) {
    let report = registry.tick(api).await;
    metrics.record_tick(
        report.polled as u64,
        report.failed as u64,
        (
            report.pruned_started as u64,
            report.pruned_full as u64,
            report.pruned_missing as u64,
        ),
        report.tracked,
    );

    let outcome = scheduler.on_tick(report.tracked, registry, api, now).await;
    match &outcome {
        ScheduleOutcome::Created { .. } => metrics.record_lobby_created(),
        ScheduleOutcome::Failed { .. } => metrics.record_schedule_failure(),
        ScheduleOutcome::Skipped | ScheduleOutcome::Deferred => {}
    }
    (report, outcome)
}

/// Run the polling loop until `shutdown` flips to `true`.
///
/// Call only once the worker fleet is ready.
pub async fn run_lobby_loop<W: WorkerApi>(
    mut registry: PublicLobbyRegistry,
    mut scheduler: LobbyScheduler,
    api: W,
    poll_interval: Duration,
    metrics: FleetMetrics,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(poll_ms = poll_interval.as_millis() as u64, "lobby loop started");

    loop {
        tokio::select! {
            at = interval.tick() => {
                let (report, _) = run_tick(
                    &mut registry,
                    &mut scheduler,
                    &api,
                    &metrics,
                    at.into_std(),
                )
                .await;
                if report.failed > 0 {
                    debug!(failed = report.failed, tracked = report.tracked, "tick finished with fetch failures");
                }
            }
            _ = shutdown.changed() => {
                info!(tracked = registry.tracked_count(), "lobby loop shutting down");
                break;
            }
        }
    }
}
