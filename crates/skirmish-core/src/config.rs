//! skirmish.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working single-host setup. Durations are written as strings such as
//! `"100ms"`, `"5s"` or `"2m"`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::routing::WorkerRouter;
use crate::types::{Difficulty, GameMapType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Deployment environment reported by `/api/env`.
    pub env: String,
    pub num_workers: u32,
    pub master: MasterConfig,
    pub workers: WorkersConfig,
    pub lobby: LobbyConfig,
    pub restart: RestartConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    pub port: u16,
    pub metrics_port: u16,
    /// Directory holding the SPA entry document (`index.html`).
    pub static_dir: String,
    /// Reverse proxies in front of the master whose `X-Forwarded-For`
    /// entries are trusted when identifying clients.
    pub trust_proxy_hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub host: String,
    /// Worker `i` listens on `base_port + i`.
    pub base_port: u16,
    pub admin_header: String,
    pub admin_token: String,
    /// How long a public lobby stays open before it starts.
    pub lobby_lifetime: String,
    /// How long a started game is kept queryable.
    pub game_retention: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    pub poll_interval: String,
    pub fetch_timeout: String,
    /// Lobbies this close to starting are dropped from the listing.
    pub prune_threshold: String,
    /// Minimum delay before retrying a failed scheduling attempt.
    pub retry_interval: String,
    pub difficulty: Difficulty,
    pub bots: u32,
    pub map_seed: u64,
    /// Copies of each map per rotation cycle, keyed by map name; `None`
    /// uses the built-in table.
    pub map_frequency: Option<BTreeMap<String, u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub initial_backoff: String,
    pub max_backoff: String,
    pub crash_loop_threshold: u32,
    pub crash_loop_window: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: "prod".to_string(),
            num_workers: 2,
            master: MasterConfig::default(),
            workers: WorkersConfig::default(),
            lobby: LobbyConfig::default(),
            restart: RestartConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            metrics_port: 9090,
            static_dir: "static".to_string(),
            trust_proxy_hops: 3,
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: 3001,
            admin_header: "x-admin-key".to_string(),
            admin_token: "dev-admin-token".to_string(),
            lobby_lifetime: "60s".to_string(),
            game_retention: "10m".to_string(),
        }
    }
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            poll_interval: "100ms".to_string(),
            fetch_timeout: "80ms".to_string(),
            prune_threshold: "250ms".to_string(),
            retry_interval: "100ms".to_string(),
            difficulty: Difficulty::Medium,
            bots: 400,
            map_seed: 123,
            map_frequency: None,
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_backoff: "0ms".to_string(),
            max_backoff: "30s".to_string(),
            crash_loop_threshold: 5,
            crash_loop_window: "60s".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: "1s".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Apply `GAME_ENV` / `ADMIN_TOKEN` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup("GAME_ENV").filter(|v| !v.is_empty()) {
            self.env = env;
        }
        if let Some(token) = lookup("ADMIN_TOKEN").filter(|v| !v.is_empty()) {
            self.workers.admin_token = token;
        }
    }

    /// Check cross-field constraints and that every duration parses.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid("num_workers must be at least 1".into()));
        }
        if u64::from(self.workers.base_port) + u64::from(self.num_workers) - 1 > u64::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "workers.base_port {} leaves no room for {} workers",
                self.workers.base_port, self.num_workers
            )));
        }
        if self.workers.admin_header.trim().is_empty() {
            return Err(ConfigError::Invalid("workers.admin_header must not be empty".into()));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_requests must be at least 1".into()));
        }
        if self.restart.crash_loop_threshold == 0 {
            return Err(ConfigError::Invalid(
                "restart.crash_loop_threshold must be at least 1".into(),
            ));
        }

        let poll = self.poll_interval()?;
        let fetch = self.fetch_timeout()?;
        if poll.is_zero() {
            return Err(ConfigError::Invalid("lobby.poll_interval must be positive".into()));
        }
        if fetch >= poll {
            return Err(ConfigError::Invalid(format!(
                "lobby.fetch_timeout ({fetch:?}) must be shorter than lobby.poll_interval ({poll:?})"
            )));
        }
        self.prune_threshold()?;
        self.retry_interval()?;
        self.lobby_lifetime()?;
        self.game_retention()?;
        if self.initial_backoff()? > self.max_backoff()? {
            return Err(ConfigError::Invalid(
                "restart.initial_backoff must not exceed restart.max_backoff".into(),
            ));
        }
        self.crash_loop_window()?;
        self.map_frequency()?;
        if self.rate_limit_window()?.is_zero() {
            return Err(ConfigError::Invalid("rate_limit.window must be positive".into()));
        }
        Ok(())
    }

    /// Router for this fleet.
    pub fn router(&self) -> WorkerRouter {
        WorkerRouter::new(self.num_workers, self.workers.base_port)
    }

    /// Configured map frequency table, if any.
    pub fn map_frequency(&self) -> ConfigResult<Option<Vec<(GameMapType, u32)>>> {
        let Some(table) = &self.lobby.map_frequency else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(table.len());
        for (name, count) in table {
            let map = GameMapType::from_name(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown map in lobby.map_frequency: {name}")))?;
            out.push((map, *count));
        }
        Ok(Some(out))
    }

    pub fn poll_interval(&self) -> ConfigResult<Duration> {
        field_duration("lobby.poll_interval", &self.lobby.poll_interval)
    }

    pub fn fetch_timeout(&self) -> ConfigResult<Duration> {
        field_duration("lobby.fetch_timeout", &self.lobby.fetch_timeout)
    }

    pub fn prune_threshold(&self) -> ConfigResult<Duration> {
        field_duration("lobby.prune_threshold", &self.lobby.prune_threshold)
    }

    pub fn retry_interval(&self) -> ConfigResult<Duration> {
        field_duration("lobby.retry_interval", &self.lobby.retry_interval)
    }

    pub fn lobby_lifetime(&self) -> ConfigResult<Duration> {
        field_duration("workers.lobby_lifetime", &self.workers.lobby_lifetime)
    }

    pub fn game_retention(&self) -> ConfigResult<Duration> {
        field_duration("workers.game_retention", &self.workers.game_retention)
    }

    pub fn initial_backoff(&self) -> ConfigResult<Duration> {
        field_duration("restart.initial_backoff", &self.restart.initial_backoff)
    }

    pub fn max_backoff(&self) -> ConfigResult<Duration> {
        field_duration("restart.max_backoff", &self.restart.max_backoff)
    }

    pub fn crash_loop_window(&self) -> ConfigResult<Duration> {
        field_duration("restart.crash_loop_window", &self.restart.crash_loop_window)
    }

    pub fn rate_limit_window(&self) -> ConfigResult<Duration> {
        field_duration("rate_limit.window", &self.rate_limit.window)
    }
}

fn field_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
