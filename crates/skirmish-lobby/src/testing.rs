//! In-memory worker fleet for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use skirmish_core::{ClientInfo, GameConfig, GameId, GameInfo, epoch_millis};

use crate::client::WorkerApi;
use crate::error::{LobbyError, LobbyResult};

#[derive(Default)]
struct FakeState {
    games: HashMap<GameId, GameInfo>,
    unreachable: HashSet<GameId>,
    fail_creates: u32,
    created: Vec<(GameId, GameConfig)>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeWorkers {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeWorkers {
    pub fn fail_next_creates(&self, n: u32) {
        self.inner.lock().unwrap().fail_creates = n;
    }

    pub fn created(&self) -> Vec<(GameId, GameConfig)> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn fill(&self, game_id: &str) {
        let mut state = self.inner.lock().unwrap();
        let game = state.games.get_mut(game_id).unwrap();
        let max = game.game_config.max_players as usize;
        while game.clients.len() < max {
            let n = game.clients.len();
            game.clients.push(ClientInfo {
                client_id: format!("c{n}"),
                username: format!("player{n}"),
            });
        }
    }

    pub fn set_unreachable(&self, game_id: &str, unreachable: bool) {
        let mut state = self.inner.lock().unwrap();
        if unreachable {
            state.unreachable.insert(game_id.to_string());
        } else {
            state.unreachable.remove(game_id);
        }
    }

    pub fn forget(&self, game_id: &str) {
        self.inner.lock().unwrap().games.remove(game_id);
    }
}

impl WorkerApi for FakeWorkers {
    async fn fetch_game(&self, game_id: &str) -> LobbyResult<GameInfo> {
        let state = self.inner.lock().unwrap();
        if state.unreachable.contains(game_id) {
            return Err(LobbyError::Connect {
                address: "fake".into(),
                reason: "unreachable".into(),
            });
        }
        state
            .games
            .get(game_id)
            .cloned()
            .ok_or_else(|| LobbyError::NotFound(game_id.to_string()))
    }

    async fn create_game(&self, game_id: &str, config: &GameConfig) -> LobbyResult<()> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_creates > 0 {
            state.fail_creates -= 1;
            return Err(LobbyError::Status {
                uri: game_id.to_string(),
                status: 500,
            });
        }
        state.games.insert(
            game_id.to_string(),
            GameInfo {
                game_id: game_id.to_string(),
                clients: Vec::new(),
                game_config: config.clone(),
                ms_until_start: Some(epoch_millis() + 60_000),
            },
        );
        state.created.push((game_id.to_string(), config.clone()));
        Ok(())
    }
}
