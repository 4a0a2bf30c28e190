use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::coverage::DEFAULT_GAP_THRESHOLD_SECS;
use crate::reconcile::DEFAULT_TAIL_LEN;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Snapshot directory (overrides XDG default).
    pub data_dir: Option<PathBuf>,
    /// Seconds to wait between fetch cycles.
    pub poll_interval_secs: u64,
    /// Save a snapshot every N cycles.
    pub save_every_cycles: u32,
    /// Recent plays per station compared against each new fetch.
    pub tail_len: usize,
    /// Longest gap between plays still counted as continuous coverage.
    pub gap_threshold_secs: i64,
    /// HTTP timeout per station fetch.
    pub fetch_timeout_secs: u64,
    /// Stations to poll.
    pub stations: Vec<StationConfig>,
}

/// One polled station.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Name used as the station key in snapshots.
    pub name: String,
    /// URL of a JSON "recently played" feed.
    pub url: String,
    /// The feed lists the most recent play first.
    #[serde(default)]
    pub newest_first: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            poll_interval_secs: 210,
            save_every_cycles: 2,
            tail_len: DEFAULT_TAIL_LEN,
            gap_threshold_secs: DEFAULT_GAP_THRESHOLD_SECS,
            fetch_timeout_secs: 5,
            stations: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/airplay/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse TOML config. Out-of-range values fall back to their defaults.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(contents)?;
        if config.gap_threshold_secs < 0 {
            log::warn!(
                "gap_threshold_secs = {} is negative, using {}",
                config.gap_threshold_secs,
                DEFAULT_GAP_THRESHOLD_SECS
            );
            config.gap_threshold_secs = DEFAULT_GAP_THRESHOLD_SECS;
        }
        Ok(config)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default snapshot directory using XDG data directory.
pub fn default_data_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().join("snapshots")
    } else {
        // Fallback: current directory
        PathBuf::from("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.poll_interval_secs, 210);
        assert_eq!(config.tail_len, 6);
        assert_eq!(config.gap_threshold_secs, 720);
        assert!(config.stations.is_empty());
    }

    #[test]
    fn test_stations_and_overrides() {
        let config = AppConfig::parse(
            r#"
            poll_interval_secs = 300
            data_dir = "/tmp/airplay"

            [[stations]]
            name = "KLOVE"
            url = "https://example.com/klove.json"
            newest_first = true

            [[stations]]
            name = "Air1"
            url = "https://example.com/air1.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.save_every_cycles, 2);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/airplay")));
        assert_eq!(config.stations.len(), 2);
        assert!(config.stations[0].newest_first);
        assert!(!config.stations[1].newest_first);
    }

    #[test]
    fn test_negative_gap_threshold_uses_default() {
        let config = AppConfig::parse("gap_threshold_secs = -5").unwrap();
        assert_eq!(config.gap_threshold_secs, DEFAULT_GAP_THRESHOLD_SECS);
        let config = AppConfig::parse("gap_threshold_secs = 0").unwrap();
        assert_eq!(config.gap_threshold_secs, 0);
    }

    #[test]
    fn test_bad_config_is_an_error() {
        assert!(AppConfig::parse("poll_interval_secs = \"soon\"").is_err());
    }
}
