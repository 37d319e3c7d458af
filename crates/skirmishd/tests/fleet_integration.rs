//! Fleet integration tests.
//!
//! Runs real worker HTTP servers on ephemeral ports and drives the lobby
//! loop against them tick by tick, then checks the supervisor against the
//! actual `skirmishd worker` binary.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::watch;

use skirmish_core::{ServerConfig, epoch_millis};
use skirmish_lobby::{
    LobbyError, LobbyScheduler, PublicLobbyList, PublicLobbyRegistry, ScheduleOutcome, WorkerApi,
    WorkerClient, run_tick,
};
use skirmish_metrics::FleetMetrics;
use skirmish_supervisor::{RestartPolicy, WorkerCommand, WorkerSupervisor};
use skirmish_worker::{GameStore, WorkerState};

struct Fleet {
    config: ServerConfig,
    store: GameStore,
    shutdown: watch::Sender<bool>,
}

/// Start one in-process worker and a config that routes every game to it.
async fn start_worker() -> Fleet {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = ServerConfig::default();
    config.num_workers = 1;
    config.workers.host = "127.0.0.1".to_string();
    config.workers.base_port = port;
    config.lobby.poll_interval = "1s".to_string();
    config.lobby.fetch_timeout = "500ms".to_string();
    config.validate().unwrap();

    let state = WorkerState::from_config(&config, 0).unwrap();
    let store = state.store.clone();
    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(skirmish_worker::serve(listener, state, rx));

    Fleet {
        config,
        store,
        shutdown,
    }
}

fn listing(raw: &str) -> PublicLobbyList {
    serde_json::from_str(raw).unwrap()
}

#[tokio::test]
async fn lobby_lifecycle_against_live_worker() {
    let fleet = start_worker().await;
    let client = WorkerClient::from_config(&fleet.config).unwrap();
    let metrics = FleetMetrics::new(1);
    let (mut registry, lobbies) = PublicLobbyRegistry::new(fleet.config.prune_threshold().unwrap());
    let mut scheduler = LobbyScheduler::from_config(&fleet.config).unwrap();
    let start = Instant::now();

    // First tick: nothing tracked, so a lobby is created.
    let (_, outcome) = run_tick(&mut registry, &mut scheduler, &client, &metrics, start).await;
    let (first_id, first_map) = match outcome {
        ScheduleOutcome::Created { game_id, map } => (game_id, map),
        other => panic!("expected a new lobby, got {other:?}"),
    };
    assert!(registry.is_tracked(&first_id));
    let hosted = fleet.store.get(&first_id).await.unwrap();
    assert_eq!(hosted.game_config.game_map, first_map);

    // Second tick: the lobby is polled and published.
    let (report, outcome) = run_tick(
        &mut registry,
        &mut scheduler,
        &client,
        &metrics,
        start + Duration::from_millis(100),
    )
    .await;
    assert_eq!(report.polled, 1);
    assert_eq!(outcome, ScheduleOutcome::Skipped);
    let published = listing(&lobbies.current());
    assert_eq!(published.lobbies.len(), 1);
    assert_eq!(published.lobbies[0].game_id, first_id);
    assert_eq!(published.lobbies[0].num_clients, 0);

    // Fill it up.
    let cap = hosted.game_config.max_players;
    for i in 0..cap {
        fleet
            .store
            .join(&first_id, &format!("player{i}"), epoch_millis())
            .await
            .unwrap();
    }

    // Third tick: pruned as full, replaced by a lobby on another map.
    let (report, outcome) = run_tick(
        &mut registry,
        &mut scheduler,
        &client,
        &metrics,
        start + Duration::from_millis(200),
    )
    .await;
    assert_eq!(report.pruned_full, 1);
    let (second_id, second_map) = match outcome {
        ScheduleOutcome::Created { game_id, map } => (game_id, map),
        other => panic!("expected a replacement lobby, got {other:?}"),
    };
    assert_ne!(second_id, first_id);
    assert_ne!(second_map, first_map);
    assert!(!registry.is_tracked(&first_id));
    assert!(registry.is_tracked(&second_id));

    // The full lobby is gone from the listing; the new one shows after a poll.
    assert!(listing(&lobbies.current()).lobbies.is_empty());
    run_tick(
        &mut registry,
        &mut scheduler,
        &client,
        &metrics,
        start + Duration::from_millis(300),
    )
    .await;
    let published = listing(&lobbies.current());
    assert_eq!(published.lobbies.len(), 1);
    assert_eq!(published.lobbies[0].game_id, second_id);

    let snap = metrics.snapshot();
    assert_eq!(snap.lobbies_created, 2);
    assert_eq!(snap.pruned_full, 1);
    assert_eq!(snap.ticks, 4);

    let _ = fleet.shutdown.send(true);
}

#[tokio::test]
async fn unknown_games_are_pruned_as_missing() {
    let fleet = start_worker().await;
    let client = WorkerClient::from_config(&fleet.config).unwrap();
    let (mut registry, _lobbies) = PublicLobbyRegistry::new(Duration::from_millis(250));

    let err = client.fetch_game("ZZZZZZZZ").await.unwrap_err();
    assert!(err.is_not_found());

    registry.track("ZZZZZZZZ");
    let report = registry.tick(&client).await;
    assert_eq!(report.pruned_missing, 1);
    assert_eq!(report.tracked, 0);

    let _ = fleet.shutdown.send(true);
}

#[tokio::test]
async fn force_started_lobby_is_pruned_as_started() {
    let fleet = start_worker().await;
    let client = WorkerClient::from_config(&fleet.config).unwrap();
    let metrics = FleetMetrics::new(1);
    let (mut registry, lobbies) = PublicLobbyRegistry::new(fleet.config.prune_threshold().unwrap());
    let mut scheduler = LobbyScheduler::from_config(&fleet.config).unwrap();
    let start = Instant::now();

    let (_, outcome) = run_tick(&mut registry, &mut scheduler, &client, &metrics, start).await;
    let game_id = match outcome {
        ScheduleOutcome::Created { game_id, .. } => game_id,
        other => panic!("expected a new lobby, got {other:?}"),
    };

    client.start_game(&game_id).await.unwrap();
    assert!(fleet.store.get(&game_id).await.unwrap().ms_until_start.is_some());

    let report = registry.tick(&client).await;
    assert_eq!(report.pruned_started, 1);
    assert_eq!(report.tracked, 0);
    assert!(!registry.is_tracked(&game_id));
    assert!(listing(&lobbies.current()).lobbies.is_empty());

    // A second start is refused by the worker.
    let err = client.start_game(&game_id).await.unwrap_err();
    assert!(matches!(err, LobbyError::Status { status: 409, .. }));

    let _ = fleet.shutdown.send(true);
}

#[tokio::test]
async fn unreachable_worker_keeps_lobby_and_backs_off() {
    // Reserve a port, then release it so nothing listens there.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = ServerConfig::default();
    config.num_workers = 1;
    config.workers.base_port = port;
    config.lobby.retry_interval = "1s".to_string();

    let client = WorkerClient::from_config(&config).unwrap();
    let metrics = FleetMetrics::new(1);
    let (mut registry, lobbies) = PublicLobbyRegistry::new(config.prune_threshold().unwrap());
    let mut scheduler = LobbyScheduler::from_config(&config).unwrap();
    let start = Instant::now();

    let (_, outcome) = run_tick(&mut registry, &mut scheduler, &client, &metrics, start).await;
    let failed_map = match outcome {
        ScheduleOutcome::Failed { map, .. } => map,
        other => panic!("expected a failed create, got {other:?}"),
    };
    assert_eq!(registry.tracked_count(), 0);

    let (_, outcome) = run_tick(
        &mut registry,
        &mut scheduler,
        &client,
        &metrics,
        start + Duration::from_millis(100),
    )
    .await;
    assert_eq!(outcome, ScheduleOutcome::Deferred);

    // After the retry interval the same map is tried again.
    let (_, outcome) = run_tick(
        &mut registry,
        &mut scheduler,
        &client,
        &metrics,
        start + Duration::from_secs(2),
    )
    .await;
    match outcome {
        ScheduleOutcome::Failed { map, .. } => assert_eq!(map, failed_map),
        other => panic!("expected a second failed create, got {other:?}"),
    }
    assert_eq!(metrics.snapshot().schedule_failures, 2);

    // A tracked lobby on a dead worker stays tracked but unlisted.
    registry.track("AAAAAAAA");
    let report = registry.tick(&client).await;
    assert_eq!(report.failed, 1);
    assert!(registry.is_tracked("AAAAAAAA"));
    assert!(listing(&lobbies.current()).lobbies.is_empty());

    let mut results = HashMap::new();
    results.insert(
        "AAAAAAAA".to_string(),
        Err(LobbyError::Http("connection reset".into())),
    );
    let report = registry.apply(results, epoch_millis());
    assert_eq!(report.failed, 1);
    assert_eq!(report.tracked, 1);
}

// ── Real worker processes ──────────────────────────────────────

async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn supervisor_restarts_worker_binary() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = ServerConfig::default();
    config.num_workers = 1;
    config.workers.base_port = port;
    config.lobby.poll_interval = "2s".to_string();
    config.lobby.fetch_timeout = "1s".to_string();

    let command = WorkerCommand::new(env!("CARGO_BIN_EXE_skirmishd"))
        .arg("worker")
        .arg("--base-port")
        .arg(port.to_string())
        .env("RUST_LOG", "warn");
    let (supervisor, handle, mut ready) = WorkerSupervisor::new(
        command,
        1,
        RestartPolicy::default(),
        FleetMetrics::new(1),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(supervisor.run(shutdown_rx));

    let became_ready = tokio::time::timeout(Duration::from_secs(20), ready.wait())
        .await
        .unwrap();
    assert!(became_ready);

    let client = WorkerClient::from_config(&config).unwrap();
    assert!(client.fetch_game("ZZZZZZZZ").await.unwrap_err().is_not_found());

    let first_pid = handle.status().await[0].pid;
    assert!(first_pid.is_some());
    handle.kill(0).await.unwrap();

    let restarted = wait_until(Duration::from_secs(20), || {
        let handle = handle.clone();
        async move {
            let status = handle.status().await;
            status[0].pid.is_some()
                && status[0].pid != first_pid
                && status[0].state == skirmish_supervisor::WorkerState::Ready
        }
    })
    .await;
    assert!(restarted, "worker 0 did not come back");

    let served = wait_until(Duration::from_secs(5), || {
        let client = client.clone();
        async move {
            matches!(client.fetch_game("ZZZZZZZZ").await, Err(e) if e.is_not_found())
        }
    })
    .await;
    assert!(served, "restarted worker is not serving");

    let _ = shutdown_tx.send(true);
    run.await.unwrap();
}
