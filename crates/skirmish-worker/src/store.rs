//! In-memory game sessions hosted by one worker.
//!
//! Public games get a countdown of `lobby_lifetime` at creation and count as
//! started once it runs out. Private games wait for their host to start
//! them. Finished lobbies are dropped by [`GameStore::reap`] after
//! `retention`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use skirmish_core::{ClientInfo, GameConfig, GameId, GameInfo, GameType, generate_game_id};

use crate::error::{WorkerError, WorkerResult};

/// One hosted game.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub config: GameConfig,
    pub clients: Vec<ClientInfo>,
    pub created_at_ms: u64,
    /// Absolute start time in epoch milliseconds, once known.
    pub start_at_ms: Option<u64>,
}

impl GameSession {
    fn has_started(&self, now_ms: u64) -> bool {
        self.start_at_ms.is_some_and(|start| start <= now_ms)
    }

    fn info(&self, game_id: &str) -> GameInfo {
        GameInfo {
            game_id: game_id.to_string(),
            clients: self.clients.clone(),
            game_config: self.config.clone(),
            ms_until_start: self.start_at_ms,
        }
    }
}

/// Shared, cloneable game table.
#[derive(Clone)]
pub struct GameStore {
    games: Arc<RwLock<HashMap<GameId, GameSession>>>,
    lobby_lifetime: Duration,
    retention: Duration,
}

impl GameStore {
    pub fn new(lobby_lifetime: Duration, retention: Duration) -> Self {
        Self {
            games: Arc::new(RwLock::new(HashMap::new())),
            lobby_lifetime,
            retention,
        }
    }

    /// Create a game. Public games start counting down immediately.
    pub async fn create(
        &self,
        game_id: &str,
        config: GameConfig,
        now_ms: u64,
    ) -> WorkerResult<GameInfo> {
        let mut games = self.games.write().await;
        if games.contains_key(game_id) {
            return Err(WorkerError::AlreadyExists(game_id.to_string()));
        }
        let start_at_ms = match config.game_type {
            GameType::Public => Some(now_ms + self.lobby_lifetime.as_millis() as u64),
            GameType::Private | GameType::Singleplayer => None,
        };
        let session = GameSession {
            config,
            clients: Vec::new(),
            created_at_ms: now_ms,
            start_at_ms,
        };
        let info = session.info(game_id);
        games.insert(game_id.to_string(), session);
        info!(%game_id, map = %info.game_config.game_map, game_type = ?info.game_config.game_type, "game created");
        Ok(info)
    }

    pub async fn get(&self, game_id: &str) -> WorkerResult<GameInfo> {
        let games = self.games.read().await;
        games
            .get(game_id)
            .map(|s| s.info(game_id))
            .ok_or_else(|| WorkerError::NotFound(game_id.to_string()))
    }

    /// Replace a private lobby's configuration before it starts.
    pub async fn update_config(
        &self,
        game_id: &str,
        mut config: GameConfig,
        now_ms: u64,
    ) -> WorkerResult<GameInfo> {
        let mut games = self.games.write().await;
        let session = games
            .get_mut(game_id)
            .ok_or_else(|| WorkerError::NotFound(game_id.to_string()))?;
        if session.config.game_type != GameType::Private {
            return Err(WorkerError::NotPrivate(game_id.to_string()));
        }
        if session.has_started(now_ms) {
            return Err(WorkerError::AlreadyStarted(game_id.to_string()));
        }
        config.game_type = GameType::Private;
        session.config = config;
        debug!(%game_id, map = %session.config.game_map, "lobby reconfigured");
        Ok(session.info(game_id))
    }

    /// Start a game now.
    pub async fn start(&self, game_id: &str, now_ms: u64) -> WorkerResult<GameInfo> {
        let mut games = self.games.write().await;
        let session = games
            .get_mut(game_id)
            .ok_or_else(|| WorkerError::NotFound(game_id.to_string()))?;
        if session.has_started(now_ms) {
            return Err(WorkerError::AlreadyStarted(game_id.to_string()));
        }
        session.start_at_ms = Some(now_ms);
        info!(%game_id, clients = session.clients.len(), "game started");
        Ok(session.info(game_id))
    }

    /// Add a player to a lobby that has not started and has room.
    pub async fn join(&self, game_id: &str, username: &str, now_ms: u64) -> WorkerResult<ClientInfo> {
        let mut games = self.games.write().await;
        let session = games
            .get_mut(game_id)
            .ok_or_else(|| WorkerError::NotFound(game_id.to_string()))?;
        if session.has_started(now_ms) {
            return Err(WorkerError::AlreadyStarted(game_id.to_string()));
        }
        if session.clients.len() as u32 >= session.config.max_players {
            return Err(WorkerError::Full(game_id.to_string()));
        }
        let client = ClientInfo {
            client_id: generate_game_id(),
            username: username.to_string(),
        };
        session.clients.push(client.clone());
        debug!(%game_id, username, clients = session.clients.len(), "client joined");
        Ok(client)
    }

    /// Drop games that started (or were created, if never started) more than
    /// `retention` ago. Returns how many were removed.
    pub async fn reap(&self, now_ms: u64) -> usize {
        let retention = self.retention.as_millis() as u64;
        let mut games = self.games.write().await;
        let before = games.len();
        games.retain(|_, s| {
            let since = s.start_at_ms.unwrap_or(s.created_at_ms);
            since.saturating_add(retention) > now_ms
        });
        let removed = before - games.len();
        if removed > 0 {
            debug!(removed, remaining = games.len(), "expired games reaped");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.games.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.games.read().await.is_empty()
    }
}
