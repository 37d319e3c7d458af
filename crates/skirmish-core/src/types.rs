//! Game-facing domain types shared by the master and the workers.
//!
//! Field names follow the JSON wire format spoken by browser clients and
//! worker processes (camelCase, `gameID`).

use serde::{Deserialize, Serialize};

/// Opaque game identifier.
pub type GameId = String;

/// Stable logical identity of a worker slot, in `[0, num_workers)`.
pub type WorkerId = u32;

/// Playable maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GameMapType {
    World,
    Europe,
    Mena,
    #[serde(rename = "North America")]
    NorthAmerica,
    #[serde(rename = "Black Sea")]
    BlackSea,
    Africa,
    Asia,
    Mars,
    Britannia,
    #[serde(rename = "Gateway to the Atlantic")]
    GatewayToTheAtlantic,
    Iceland,
}

impl GameMapType {
    /// Every map, in declaration order.
    pub const ALL: [GameMapType; 11] = [
        GameMapType::World,
        GameMapType::Europe,
        GameMapType::Mena,
        GameMapType::NorthAmerica,
        GameMapType::BlackSea,
        GameMapType::Africa,
        GameMapType::Asia,
        GameMapType::Mars,
        GameMapType::Britannia,
        GameMapType::GatewayToTheAtlantic,
        GameMapType::Iceland,
    ];

    /// Look a map up by its display name or its identifier
    /// (`"Black Sea"` and `"BlackSea"` both work).
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        Self::ALL.into_iter().find(|map| {
            let display: String = map.to_string().chars().filter(|c| !c.is_whitespace()).collect();
            display.eq_ignore_ascii_case(&wanted)
        })
    }

    /// Player cap for a public lobby on this map.
    pub fn lobby_max_players(self) -> u32 {
        match self {
            GameMapType::World => 150,
            GameMapType::Europe | GameMapType::NorthAmerica | GameMapType::Asia => 100,
            GameMapType::Africa | GameMapType::Mena => 80,
            _ => 60,
        }
    }
}

impl std::fmt::Display for GameMapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GameMapType::World => "World",
            GameMapType::Europe => "Europe",
            GameMapType::Mena => "Mena",
            GameMapType::NorthAmerica => "North America",
            GameMapType::BlackSea => "Black Sea",
            GameMapType::Africa => "Africa",
            GameMapType::Asia => "Asia",
            GameMapType::Mars => "Mars",
            GameMapType::Britannia => "Britannia",
            GameMapType::GatewayToTheAtlantic => "Gateway to the Atlantic",
            GameMapType::Iceland => "Iceland",
        };
        f.write_str(name)
    }
}

/// AI difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Impossible,
}

/// Visibility of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    Singleplayer,
    Public,
    Private,
}

/// Configuration a game session is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub game_map: GameMapType,
    pub max_players: u32,
    pub game_type: GameType,
    pub difficulty: Difficulty,
    #[serde(rename = "disableNPCs")]
    pub disable_npcs: bool,
    pub disable_nukes: bool,
    pub bots: u32,
    pub infinite_gold: bool,
    pub infinite_troops: bool,
    pub instant_build: bool,
}

impl GameConfig {
    /// Default configuration for an auto-scheduled public game on `map`.
    pub fn public(map: GameMapType, difficulty: Difficulty, bots: u32) -> Self {
        Self {
            game_map: map,
            max_players: map.lobby_max_players(),
            game_type: GameType::Public,
            difficulty,
            disable_npcs: false,
            disable_nukes: false,
            bots,
            infinite_gold: false,
            infinite_troops: false,
            instant_build: false,
        }
    }

    /// Default configuration for a host-created private lobby.
    pub fn private_default() -> Self {
        Self {
            game_type: GameType::Private,
            ..Self::public(GameMapType::World, Difficulty::Medium, 400)
        }
    }
}

/// A connected player as reported by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub username: String,
}

/// Body of `POST /api/create_game/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub game_config: GameConfig,
}

/// Game state returned by a worker's `GET /api/game/{id}`.
///
/// `ms_until_start` is the absolute start time in epoch milliseconds,
/// absent for lobbies without a countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    #[serde(rename = "gameID")]
    pub game_id: GameId,
    #[serde(default)]
    pub clients: Vec<ClientInfo>,
    pub game_config: GameConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ms_until_start: Option<u64>,
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_names_match_wire_format() {
        let json = serde_json::to_string(&GameMapType::GatewayToTheAtlantic).unwrap();
        assert_eq!(json, "\"Gateway to the Atlantic\"");
        let back: GameMapType = serde_json::from_str("\"North America\"").unwrap();
        assert_eq!(back, GameMapType::NorthAmerica);
        assert_eq!(GameMapType::BlackSea.to_string(), "Black Sea");
    }

    #[test]
    fn from_name_accepts_both_spellings() {
        assert_eq!(GameMapType::from_name("Black Sea"), Some(GameMapType::BlackSea));
        assert_eq!(GameMapType::from_name("BlackSea"), Some(GameMapType::BlackSea));
        assert_eq!(
            GameMapType::from_name("GatewayToTheAtlantic"),
            Some(GameMapType::GatewayToTheAtlantic)
        );
        assert_eq!(GameMapType::from_name("Atlantis"), None);
    }

    #[test]
    fn public_config_uses_map_player_cap() {
        let config = GameConfig::public(GameMapType::World, Difficulty::Medium, 400);
        assert_eq!(config.max_players, 150);
        assert_eq!(config.game_type, GameType::Public);
        assert!(!config.instant_build && !config.infinite_gold && !config.disable_nukes);
    }

    #[test]
    fn game_config_serializes_camel_case() {
        let config = GameConfig::public(GameMapType::Mars, Difficulty::Hard, 10);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["gameMap"], "Mars");
        assert_eq!(value["maxPlayers"], 60);
        assert_eq!(value["gameType"], "Public");
        assert_eq!(value["disableNPCs"], false);
        assert_eq!(value["infiniteTroops"], false);
    }

    #[test]
    fn game_info_parses_worker_payload() {
        let body = r#"{
            "gameID": "abc12345",
            "clients": [{"clientID": "c1", "username": "ann"}],
            "gameConfig": {
                "gameMap": "Iceland", "maxPlayers": 60, "gameType": "Public",
                "difficulty": "Medium", "disableNPCs": false, "disableNukes": false,
                "bots": 400, "infiniteGold": false, "infiniteTroops": false,
                "instantBuild": false
            },
            "msUntilStart": 1700000000000
        }"#;
        let info: GameInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.game_id, "abc12345");
        assert_eq!(info.clients.len(), 1);
        assert_eq!(info.game_config.game_map, GameMapType::Iceland);
        assert_eq!(info.ms_until_start, Some(1_700_000_000_000));
    }

    #[test]
    fn game_info_without_clients_or_countdown() {
        let mut value = serde_json::to_value(GameInfo {
            game_id: "x".to_string(),
            clients: vec![],
            game_config: GameConfig::private_default(),
            ms_until_start: None,
        })
        .unwrap();
        assert!(value.get("msUntilStart").is_none());
        value.as_object_mut().unwrap().remove("clients");
        let info: GameInfo = serde_json::from_value(value).unwrap();
        assert!(info.clients.is_empty());
    }

    #[test]
    fn epoch_millis_is_recent() {
        // After 2024-01-01.
        assert!(epoch_millis() > 1_704_067_200_000);
    }
}
