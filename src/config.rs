use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Departure board configuration
    pub board: BoardConfig,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Socket address to listen on (default: 0.0.0.0:3000)
    #[serde(default = "Config::default_bind_addr")]
    pub bind_addr: String,
}

/// Configuration for the departure board: static tables, the real-time feed
/// and the presentation window.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    /// URL of the GTFS-RT trip updates protobuf feed
    pub realtime_feed_url: String,
    /// Directory holding stops.txt, stop_times.txt and routes.txt
    /// (default: ./static-gtfs)
    #[serde(default = "BoardConfig::default_static_dir")]
    pub static_dir: String,
    /// Base URL to download missing static tables from. When unset, missing
    /// tables load as empty.
    #[serde(default)]
    pub static_base_url: Option<String>,
    /// IANA timezone the schedule times are expressed in
    /// (default: Australia/Brisbane)
    #[serde(default = "BoardConfig::default_timezone")]
    pub timezone: String,
    /// How long a fetched feed stays fresh, in seconds (default: 180)
    #[serde(default = "BoardConfig::default_feed_ttl_secs")]
    pub feed_ttl_secs: u64,
    /// How far into the past a predicted event may lie, in minutes (default: 5)
    #[serde(default = "BoardConfig::default_lookback_minutes")]
    pub lookback_minutes: u32,
    /// How far into the future a predicted event may lie, in minutes
    /// (default: 120)
    #[serde(default = "BoardConfig::default_horizon_minutes")]
    pub horizon_minutes: u32,
    /// Results returned when the request gives no count (default: 20)
    #[serde(default = "BoardConfig::default_count")]
    pub default_count: usize,
    /// Station ids snapshotted to disk on manual refresh
    #[serde(default)]
    pub stations: Vec<String>,
    /// Directory for refresh snapshots. When unset, refresh skips persistence.
    #[serde(default)]
    pub snapshot_dir: Option<String>,
}

impl BoardConfig {
    fn default_static_dir() -> String {
        "./static-gtfs".to_string()
    }
    fn default_timezone() -> String {
        "Australia/Brisbane".to_string()
    }
    fn default_feed_ttl_secs() -> u64 {
        180
    }
    fn default_lookback_minutes() -> u32 {
        5
    }
    fn default_horizon_minutes() -> u32 {
        120
    }
    fn default_count() -> usize {
        20
    }

    /// Parse the configured timezone, falling back to UTC on a bad name so a
    /// typo degrades the display instead of refusing to start.
    pub fn parsed_timezone(&self) -> Tz {
        match self.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    timezone = %self.timezone,
                    "Unknown timezone, falling back to UTC"
                );
                Tz::UTC
            }
        }
    }
}

impl Config {
    fn default_bind_addr() -> String {
        "0.0.0.0:3000".to_string()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board.realtime_feed_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "board.realtime_feed_url must not be empty".to_string(),
            ));
        }
        if self.board.default_count == 0 {
            return Err(ConfigError::ValidationError(
                "board.default_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_yaml::from_str(
            "board:\n  realtime_feed_url: https://example.org/feed.pb\n",
        )
        .unwrap();
        assert_eq!(config.board.static_dir, "./static-gtfs");
        assert_eq!(config.board.timezone, "Australia/Brisbane");
        assert_eq!(config.board.feed_ttl_secs, 180);
        assert_eq!(config.board.lookback_minutes, 5);
        assert_eq!(config.board.horizon_minutes, 120);
        assert_eq!(config.board.default_count, 20);
        assert!(config.board.stations.is_empty());
        assert!(config.board.snapshot_dir.is_none());
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(!config.cors_permissive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config_overrides() {
        let config: Config = serde_yaml::from_str(
            r#"
board:
  realtime_feed_url: https://example.org/feed.pb
  static_dir: /data/gtfs
  static_base_url: https://example.org/static
  timezone: Europe/Berlin
  feed_ttl_secs: 60
  lookback_minutes: 2
  horizon_minutes: 90
  default_count: 10
  stations:
    - place_kgbs
  snapshot_dir: /var/snapshots
cors_origins:
  - https://board.example.org
bind_addr: 127.0.0.1:8080
"#,
        )
        .unwrap();
        assert_eq!(config.board.static_dir, "/data/gtfs");
        assert_eq!(config.board.feed_ttl_secs, 60);
        assert_eq!(config.board.stations, vec!["place_kgbs"]);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.board.parsed_timezone(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        let config: Config = serde_yaml::from_str(
            "board:\n  realtime_feed_url: https://example.org/feed.pb\n  timezone: Mars/Olympus\n",
        )
        .unwrap();
        assert_eq!(config.board.parsed_timezone(), Tz::UTC);
    }

    #[test]
    fn validation_rejects_empty_feed_url() {
        let config: Config =
            serde_yaml::from_str("board:\n  realtime_feed_url: \"  \"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn validation_rejects_zero_count() {
        let config: Config = serde_yaml::from_str(
            "board:\n  realtime_feed_url: https://example.org/feed.pb\n  default_count: 0\n",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
