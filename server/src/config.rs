use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::engine::broker::BrokerSettings;
use crate::engine::validation;

/// Top-level server configuration, loaded from roomcast.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RoomcastConfig {
    pub server: ServerSection,
    pub limits: LimitsSection,
    pub rooms: RoomsSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5000".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_message_length: usize,
    /// Message rate limit: burst capacity per identity.
    pub message_burst: u32,
    /// Message rate limit: seconds to refill one token.
    pub message_refill_seconds: f64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_message_length: validation::DEFAULT_MAX_MESSAGE_LENGTH,
            message_burst: 10,
            message_refill_seconds: 1.0,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct RoomsSection {
    /// Drop a room (and its message ledger) once the last member leaves.
    /// Off by default: clients expect history to survive a rejoin.
    pub evict_empty_rooms: bool,
}

impl Default for RoomsSection {
    fn default() -> Self {
        Self {
            evict_empty_rooms: false,
        }
    }
}

impl RoomcastConfig {
    /// Load config from a TOML file. Falls back to defaults if the file
    /// doesn't exist. Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LISTEN_ADDRESS") {
            self.server.listen_address = v;
        }
        if let Ok(v) = std::env::var("MAX_MESSAGE_LENGTH")
            && let Ok(len) = v.parse()
        {
            self.limits.max_message_length = len;
        }
        if let Ok(v) = std::env::var("MESSAGE_BURST")
            && let Ok(burst) = v.parse()
        {
            self.limits.message_burst = burst;
        }
        if let Ok(v) = std::env::var("MESSAGE_REFILL_SECONDS")
            && let Ok(seconds) = v.parse()
        {
            self.limits.message_refill_seconds = seconds;
        }
        if let Ok(v) = std::env::var("EVICT_EMPTY_ROOMS") {
            self.rooms.evict_empty_rooms = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Convert into the broker's tunables.
    pub fn to_broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            max_message_length: self.limits.max_message_length,
            evict_empty_rooms: self.rooms.evict_empty_rooms,
            message_burst: self.limits.message_burst,
            message_refill_seconds: self.limits.message_refill_seconds,
        }
    }
}
