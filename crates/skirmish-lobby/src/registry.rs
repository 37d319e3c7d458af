//! Public lobby registry: the fleet-wide view of open public lobbies.
//!
//! The registry owns the set of tracked game IDs and the writer side of the
//! published snapshot. It is mutated only by [`PublicLobbyRegistry::tick`],
//! which the lobby loop calls once per poll interval; HTTP handlers read the
//! snapshot through a [`PublicLobbies`] handle and always see a complete
//! serialized listing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use skirmish_core::{GameConfig, GameId, GameInfo, epoch_millis};

use crate::client::WorkerApi;
use crate::error::LobbyResult;

/// One lobby as listed to browser clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLobbyRecord {
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    pub num_clients: u32,
    /// Milliseconds left before the game starts.
    pub ms_until_start: u64,
    pub game_config: GameConfig,
}

/// The serialized listing: `{"lobbies": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicLobbyList {
    pub lobbies: Vec<PublicLobbyRecord>,
}

impl PublicLobbyList {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| EMPTY_LISTING.to_string())
    }
}

const EMPTY_LISTING: &str = r#"{"lobbies":[]}"#;

/// Why a lobby left the tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    /// Its countdown reached the stop threshold.
    Started,
    /// Its client count reached the player cap.
    Full,
    /// Its worker no longer knows the game.
    Missing,
}

/// Outcome of one polling tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Lobbies fetched successfully.
    pub polled: usize,
    /// Lobbies whose fetch failed transiently.
    pub failed: usize,
    pub pruned_started: usize,
    pub pruned_full: usize,
    pub pruned_missing: usize,
    /// Lobbies still tracked after pruning.
    pub tracked: usize,
}

impl TickReport {
    fn count_prune(&mut self, reason: PruneReason) {
        match reason {
            PruneReason::Started => self.pruned_started += 1,
            PruneReason::Full => self.pruned_full += 1,
            PruneReason::Missing => self.pruned_missing += 1,
        }
    }
}

/// A tracked lobby and what the registry last learned about it.
#[derive(Debug)]
struct TrackedLobby {
    /// Insertion order, used to keep the listing stable.
    seq: u64,
    last_seen: Option<GameInfo>,
    consecutive_failures: u32,
    /// Whether the most recent fetch succeeded.
    fresh: bool,
}

/// Read side of the published snapshot.
#[derive(Debug, Clone)]
pub struct PublicLobbies {
    rx: watch::Receiver<Arc<String>>,
}

impl PublicLobbies {
    /// The latest serialized listing.
    pub fn current(&self) -> Arc<String> {
        self.rx.borrow().clone()
    }

    /// A handle that always reports `listing`, for tests and tooling.
    pub fn fixed(listing: impl Into<String>) -> Self {
        // The last value stays readable after the sender is gone.
        let (_tx, rx) = watch::channel(Arc::new(listing.into()));
        Self { rx }
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Tracks scheduled public lobbies and refreshes them from the workers.
pub struct PublicLobbyRegistry {
    lobbies: HashMap<GameId, TrackedLobby>,
    next_seq: u64,
    prune_threshold: Duration,
    snapshot_tx: watch::Sender<Arc<String>>,
}

impl PublicLobbyRegistry {
    /// Create an empty registry and the reader handle for its snapshot.
    pub fn new(prune_threshold: Duration) -> (Self, PublicLobbies) {
        let (snapshot_tx, rx) = watch::channel(Arc::new(EMPTY_LISTING.to_string()));
        let registry = Self {
            lobbies: HashMap::new(),
            next_seq: 0,
            prune_threshold,
            snapshot_tx,
        };
        (registry, PublicLobbies { rx })
    }

    /// Start tracking a lobby that a worker just created.
    ///
    /// Returns `false` if the ID is already tracked.
    pub fn track(&mut self, game_id: &str) -> bool {
        if self.lobbies.contains_key(game_id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.lobbies.insert(
            game_id.to_string(),
            TrackedLobby {
                seq,
                last_seen: None,
                consecutive_failures: 0,
                fresh: false,
            },
        );
        debug!(%game_id, "lobby tracked");
        true
    }

    pub fn is_tracked(&self, game_id: &str) -> bool {
        self.lobbies.contains_key(game_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Tracked IDs in the order they were scheduled.
    pub fn tracked_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<(&GameId, u64)> =
            self.lobbies.iter().map(|(id, l)| (id, l.seq)).collect();
        ids.sort_by_key(|(_, seq)| *seq);
        ids.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// A handle to the published snapshot.
    pub fn subscribe(&self) -> PublicLobbies {
        PublicLobbies {
            rx: self.snapshot_tx.subscribe(),
        }
    }

    /// Refresh every tracked lobby, prune, and republish the snapshot.
    pub async fn tick<W: WorkerApi>(&mut self, api: &W) -> TickReport {
        let results = self.fetch_all(api).await;
        self.apply(results, epoch_millis())
    }

    /// Fetch every tracked lobby concurrently and wait for all of them.
    async fn fetch_all<W: WorkerApi>(&self, api: &W) -> HashMap<GameId, LobbyResult<GameInfo>> {
        let mut set = JoinSet::new();
        for game_id in self.lobbies.keys() {
            let api = api.clone();
            let game_id = game_id.clone();
            set.spawn(async move {
                let result = api.fetch_game(&game_id).await;
                (game_id, result)
            });
        }

        let mut results = HashMap::with_capacity(self.lobbies.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((game_id, result)) => {
                    results.insert(game_id, result);
                }
                Err(e) => warn!(error = %e, "lobby fetch task failed"),
            }
        }
        results
    }

    /// Fold one round of fetch results into the tracked set at time `now_ms`.
    ///
    /// Lobbies without a result (a fetch task that panicked) count as failed.
    pub fn apply(
        &mut self,
        mut results: HashMap<GameId, LobbyResult<GameInfo>>,
        now_ms: u64,
    ) -> TickReport {
        let threshold_ms = self.prune_threshold.as_millis() as u64;
        let mut report = TickReport::default();
        let mut pruned: Vec<(GameId, PruneReason)> = Vec::new();

        for (game_id, lobby) in self.lobbies.iter_mut() {
            match results.remove(game_id) {
                Some(Ok(info)) => {
                    report.polled += 1;
                    lobby.consecutive_failures = 0;
                    lobby.fresh = true;
                    if let Some(reason) = prune_reason(&info, now_ms, threshold_ms) {
                        pruned.push((game_id.clone(), reason));
                    }
                    lobby.last_seen = Some(info);
                }
                Some(Err(e)) if e.is_not_found() => {
                    pruned.push((game_id.clone(), PruneReason::Missing));
                }
                failure => {
                    report.failed += 1;
                    lobby.consecutive_failures += 1;
                    lobby.fresh = false;
                    let reason = failure
                        .and_then(|r| r.err())
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no result".to_string());
                    warn!(
                        %game_id,
                        failures = lobby.consecutive_failures,
                        error = %reason,
                        "lobby fetch failed"
                    );
                    // Only known data can prune a lobby whose fetch failed.
                    let deadline_passed = lobby.last_seen.as_ref().is_some_and(|info| {
                        ms_left(info, now_ms) <= threshold_ms
                    });
                    if deadline_passed {
                        pruned.push((game_id.clone(), PruneReason::Started));
                    }
                }
            }
        }

        for (game_id, reason) in pruned {
            self.lobbies.remove(&game_id);
            report.count_prune(reason);
            info!(%game_id, ?reason, "lobby pruned");
        }

        report.tracked = self.lobbies.len();
        self.publish(now_ms);
        report
    }

    /// Serialize the surviving, freshly observed lobbies and publish them.
    fn publish(&self, now_ms: u64) {
        let mut entries: Vec<(u64, PublicLobbyRecord)> = self
            .lobbies
            .iter()
            .filter(|(_, l)| l.fresh)
            .filter_map(|(game_id, l)| {
                let info = l.last_seen.as_ref()?;
                Some((
                    l.seq,
                    PublicLobbyRecord {
                        game_id: game_id.clone(),
                        num_clients: info.clients.len() as u32,
                        ms_until_start: ms_left(info, now_ms),
                        game_config: info.game_config.clone(),
                    },
                ))
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);

        let list = PublicLobbyList {
            lobbies: entries.into_iter().map(|(_, r)| r).collect(),
        };
        self.snapshot_tx.send_replace(Arc::new(list.to_json()));
    }
}

/// Milliseconds until `info` starts; lobbies without a countdown count as
/// starting now.
fn ms_left(info: &GameInfo, now_ms: u64) -> u64 {
    info.ms_until_start
        .map(|start| start.saturating_sub(now_ms))
        .unwrap_or(0)
}

fn prune_reason(info: &GameInfo, now_ms: u64, threshold_ms: u64) -> Option<PruneReason> {
    if ms_left(info, now_ms) <= threshold_ms {
        Some(PruneReason::Started)
    } else if info.clients.len() as u32 >= info.game_config.max_players {
        Some(PruneReason::Full)
    } else {
        None
    }
}
