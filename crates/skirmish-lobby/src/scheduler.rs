//! Lobby scheduler: keeps exactly one open public lobby available.
//!
//! After every registry tick the scheduler looks at the tracked count. When
//! it is zero, it draws the next map from the rotation, picks a fresh game
//! ID and asks the owning worker to create the game. A failed attempt puts
//! the map back and is retried once `retry_interval` has passed.

use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use skirmish_core::{Difficulty, GameConfig, GameId, GameMapType, ServerConfig, generate_game_id};

use crate::client::WorkerApi;
use crate::error::{LobbyError, LobbyResult};
use crate::playlist::MapRotationPlanner;
use crate::registry::PublicLobbyRegistry;

/// Where the scheduler is in a creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleState {
    Idle,
    Attempting { game_id: GameId, map: GameMapType },
}

/// What one scheduling step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Lobbies are still open; nothing to do.
    Skipped,
    /// Nothing open, but the last failure is too recent to retry.
    Deferred,
    Created { game_id: GameId, map: GameMapType },
    Failed { game_id: GameId, map: GameMapType },
}

/// Creates a new public lobby whenever none is open.
pub struct LobbyScheduler {
    planner: MapRotationPlanner,
    difficulty: Difficulty,
    bots: u32,
    retry_interval: Duration,
    state: ScheduleState,
    last_failure: Option<Instant>,
}

impl LobbyScheduler {
    pub fn new(
        planner: MapRotationPlanner,
        difficulty: Difficulty,
        bots: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            planner,
            difficulty,
            bots,
            retry_interval,
            state: ScheduleState::Idle,
            last_failure: None,
        }
    }

    /// Build the scheduler and its map rotation from server config.
    pub fn from_config(config: &ServerConfig) -> LobbyResult<Self> {
        let invalid = |e: skirmish_core::ConfigError| LobbyError::InvalidRotation(e.to_string());
        let seed = config.lobby.map_seed;
        let planner = match config.map_frequency().map_err(invalid)? {
            Some(table) => MapRotationPlanner::with_frequencies(seed, &table)?,
            None => MapRotationPlanner::new(seed),
        };
        let retry_interval = config.retry_interval().map_err(invalid)?;
        Ok(Self::new(
            planner,
            config.lobby.difficulty,
            config.lobby.bots,
            retry_interval,
        ))
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn planner(&self) -> &MapRotationPlanner {
        &self.planner
    }

    /// Run one scheduling step for the tick that began at `now`.
    ///
    /// Creates a lobby only when `tracked` is exactly zero.
    pub async fn on_tick<W: WorkerApi>(
        &mut self,
        tracked: usize,
        registry: &mut PublicLobbyRegistry,
        api: &W,
        now: Instant,
    ) -> ScheduleOutcome {
        if tracked != 0 {
            return ScheduleOutcome::Skipped;
        }
        if let Some(failed_at) = self.last_failure {
            if now.saturating_duration_since(failed_at) < self.retry_interval {
                debug!("lobby creation deferred after recent failure");
                return ScheduleOutcome::Deferred;
            }
        }

        let mut game_id = generate_game_id();
        while registry.is_tracked(&game_id) {
            game_id = generate_game_id();
        }
        let map = self.planner.next_map();
        let config = GameConfig::public(map, self.difficulty, self.bots);

        self.state = ScheduleState::Attempting {
            game_id: game_id.clone(),
            map,
        };
        debug!(%game_id, %map, "creating public lobby");

        let result = api.create_game(&game_id, &config).await;
        self.state = ScheduleState::Idle;

        match result {
            Ok(()) => {
                registry.track(&game_id);
                self.last_failure = None;
                info!(%game_id, %map, max_players = config.max_players, "public lobby scheduled");
                ScheduleOutcome::Created { game_id, map }
            }
            Err(e) => {
                error!(%game_id, %map, error = %e, "failed to schedule public lobby");
                self.planner.restore(map);
                self.last_failure = Some(now);
                ScheduleOutcome::Failed { game_id, map }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWorkers;
    use skirmish_core::GameType;

    fn scheduler(retry: Duration) -> LobbyScheduler {
        LobbyScheduler::new(MapRotationPlanner::new(123), Difficulty::Medium, 400, retry)
    }

    fn registry() -> PublicLobbyRegistry {
        PublicLobbyRegistry::new(Duration::from_millis(250)).0
    }

    #[tokio::test]
    async fn creates_when_nothing_is_tracked() {
        let api = FakeWorkers::default();
        let mut reg = registry();
        let mut sched = scheduler(Duration::from_millis(100));

        let outcome = sched.on_tick(0, &mut reg, &api, Instant::now()).await;
        let ScheduleOutcome::Created { game_id, map } = outcome else {
            panic!("expected creation, got {outcome:?}");
        };
        assert!(reg.is_tracked(&game_id));
        assert_eq!(sched.state(), &ScheduleState::Idle);

        let created = api.created();
        assert_eq!(created.len(), 1);
        let (id, config) = &created[0];
        assert_eq!(id, &game_id);
        assert_eq!(config.game_map, map);
        assert_eq!(config.game_type, GameType::Public);
        assert_eq!(config.difficulty, Difficulty::Medium);
        assert_eq!(config.bots, 400);
        assert_eq!(config.max_players, map.lobby_max_players());
        assert!(!config.disable_npcs && !config.infinite_troops);
    }

    #[tokio::test]
    async fn skips_when_any_lobby_is_tracked() {
        let api = FakeWorkers::default();
        let mut reg = registry();
        let mut sched = scheduler(Duration::from_millis(100));

        for tracked in [1, 2, 7] {
            let outcome = sched.on_tick(tracked, &mut reg, &api, Instant::now()).await;
            assert_eq!(outcome, ScheduleOutcome::Skipped);
        }
        assert!(api.created().is_empty());
        assert_eq!(sched.planner().cycles(), 0);
    }

    #[tokio::test]
    async fn failure_restores_map_and_defers_retry() {
        let api = FakeWorkers::default();
        api.fail_next_creates(1);
        let mut reg = registry();
        let mut sched = scheduler(Duration::from_millis(100));
        let t0 = Instant::now();

        let ScheduleOutcome::Failed { map: failed_map, .. } =
            sched.on_tick(0, &mut reg, &api, t0).await
        else {
            panic!("expected failure");
        };
        assert_eq!(reg.tracked_count(), 0);
        assert_eq!(sched.planner().upcoming().next(), Some(failed_map));

        let outcome = sched
            .on_tick(0, &mut reg, &api, t0 + Duration::from_millis(50))
            .await;
        assert_eq!(outcome, ScheduleOutcome::Deferred);

        let outcome = sched
            .on_tick(0, &mut reg, &api, t0 + Duration::from_millis(100))
            .await;
        let ScheduleOutcome::Created { map, .. } = outcome else {
            panic!("expected retry to succeed, got {outcome:?}");
        };
        assert_eq!(map, failed_map);
        assert_eq!(reg.tracked_count(), 1);
    }

    #[tokio::test]
    async fn zero_retry_interval_retries_immediately() {
        let api = FakeWorkers::default();
        api.fail_next_creates(1);
        let mut reg = registry();
        let mut sched = scheduler(Duration::ZERO);
        let now = Instant::now();

        assert!(matches!(
            sched.on_tick(0, &mut reg, &api, now).await,
            ScheduleOutcome::Failed { .. }
        ));
        assert!(matches!(
            sched.on_tick(0, &mut reg, &api, now).await,
            ScheduleOutcome::Created { .. }
        ));
    }

    #[tokio::test]
    async fn consecutive_lobbies_use_different_maps() {
        let api = FakeWorkers::default();
        let mut reg = registry();
        let mut sched = scheduler(Duration::from_millis(100));

        let mut maps = Vec::new();
        for _ in 0..30 {
            let ScheduleOutcome::Created { game_id, map } =
                sched.on_tick(0, &mut reg, &api, Instant::now()).await
            else {
                panic!("expected creation");
            };
            maps.push(map);
            // Simulate the lobby being pruned before the next tick.
            reg.apply(
                [(game_id.clone(), Err(LobbyError::NotFound(game_id)))]
                    .into_iter()
                    .collect(),
                0,
            );
        }
        assert!(crate::playlist::all_non_consecutive(&maps));
    }

    #[test]
    fn from_config_uses_custom_rotation() {
        let mut config = ServerConfig::default();
        config.lobby.map_frequency = Some(
            [("Mars".to_string(), 1), ("Iceland".to_string(), 1)]
                .into_iter()
                .collect(),
        );
        config.lobby.bots = 12;
        let sched = LobbyScheduler::from_config(&config).unwrap();
        assert_eq!(sched.bots, 12);
        assert_eq!(sched.retry_interval, Duration::from_millis(100));
    }

    #[test]
    fn from_config_rejects_unknown_map() {
        let mut config = ServerConfig::default();
        config.lobby.map_frequency = Some([("Atlantis".to_string(), 2)].into_iter().collect());
        assert!(matches!(
            LobbyScheduler::from_config(&config),
            Err(LobbyError::InvalidRotation(_))
        ));
    }
}
