//! Configuration module - room connection settings and environment parsing

use std::env;
use std::time::Duration;

use url::Url;

use crate::net::ReconnectConfig;

/// Connection settings for one room
#[derive(Clone, Debug)]
pub struct RoomConfig {
    /// Base server URL; the room id is appended as the last path segment
    pub server_url: Url,
    /// Opaque room identifier namespacing the participants
    pub room_id: String,
    /// How long to wait for the join handshake after the socket opens
    pub join_timeout: Duration,
    /// Retry policy for failed or dropped connections
    pub reconnect: ReconnectConfig,
    /// Reconnect automatically after an unexpected close
    pub auto_reconnect: bool,
    /// Remote players silent for this long are removed
    pub remote_timeout: Duration,
    /// How often silent players are swept
    pub liveness_sweep: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl RoomConfig {
    pub fn new(server_url: Url, room_id: impl Into<String>) -> Self {
        Self {
            server_url,
            room_id: room_id.into(),
            join_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            auto_reconnect: true,
            remote_timeout: Duration::from_secs(30),
            liveness_sweep: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = env::var("VIBESCALE_URL")
            .map_err(|_| ConfigError::Missing("VIBESCALE_URL"))?;
        let server_url = Url::parse(&server_url).map_err(|_| ConfigError::InvalidUrl(server_url))?;
        let room_id = env::var("VIBESCALE_ROOM").map_err(|_| ConfigError::Missing("VIBESCALE_ROOM"))?;

        let mut config = Self::new(server_url, room_id);

        if let Some(ms) = parse_var::<u64>("VIBESCALE_JOIN_TIMEOUT_MS")? {
            config.join_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>("VIBESCALE_RECONNECT_ATTEMPTS")? {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(secs) = parse_var::<u64>("VIBESCALE_REMOTE_TIMEOUT_SECS")? {
            config.remote_timeout = Duration::from_secs(secs);
        }
        config.log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        config.room_url()?;
        Ok(config)
    }

    /// URL of this room's endpoint
    pub fn room_url(&self) -> Result<Url, ConfigError> {
        if self.room_id.trim().is_empty() {
            return Err(ConfigError::EmptyRoomId);
        }

        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::InvalidUrl(self.server_url.to_string()))?
            .pop_if_empty()
            .push(&self.room_id);
        Ok(url)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Room id must not be empty")]
    EmptyRoomId,

    #[error("Environment variable {0} is not a valid number")]
    InvalidNumber(&'static str),
}
