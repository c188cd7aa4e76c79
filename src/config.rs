use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::airport_api_client::DEFAULT_AIRPORT_API_URL;
use crate::airports::normalize_icao;
use crate::departures::FlightPlanPolicy;
use crate::errors::{DepartureError, Result};
use crate::ground_classifier::GroundThresholds;
use crate::network_feed::DEFAULT_SNAPSHOT_URL;

pub const API_KEY_ENV: &str = "AIRPORT_API_KEY";
pub const CONFIG_PATH_ENV: &str = "BUSY_AIRPORTS_CONFIG";

/// Top-level configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Airports to report on
    pub watch_list: Vec<String>,
    /// Binary airport reference store
    pub store_path: PathBuf,
    /// Upper bound for every outbound HTTP call
    pub request_timeout_secs: u64,
    pub network: NetworkConfig,
    pub airport_api: AirportApiConfig,
    pub thresholds: GroundThresholds,
    pub policy: FlightPlanPolicy,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub snapshot_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirportApiConfig {
    pub base_url: String,
    /// Usually supplied through `AIRPORT_API_KEY` rather than the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub interface: String,
    pub port: u16,
}

fn default_watch_list() -> Vec<String> {
    [
        "LEMD", "LEPA", "LEBL", "LEIB", "LEAL", "GCTS", "GCLP", "LEBB", "LEMG",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_list: default_watch_list(),
            store_path: PathBuf::from("airport_data.bin"),
            request_timeout_secs: 10,
            network: NetworkConfig::default(),
            airport_api: AirportApiConfig::default(),
            thresholds: GroundThresholds::default(),
            policy: FlightPlanPolicy::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            snapshot_url: DEFAULT_SNAPSHOT_URL.to_string(),
        }
    }
}

impl Default for AirportApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AIRPORT_API_URL.to_string(),
            api_key: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: "localhost".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DepartureError::Config(format!("failed to read {:?}: {}", path, e)))?;
        Self::parse(&contents)
            .map_err(|e| DepartureError::Config(format!("{:?}: {}", path, e)))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| DepartureError::Config(format!("failed to parse TOML: {}", e)))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path` when it exists, defaults otherwise, then apply environment
    /// overrides
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {:?}", path);
            Self::load(path)?
        } else {
            info!("No configuration file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.airport_api.api_key = Some(key);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn normalize(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        self.watch_list = self
            .watch_list
            .iter()
            .map(|icao| normalize_icao(icao))
            .filter(|icao| seen.insert(icao.clone()))
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        if self.watch_list.is_empty() {
            return Err(DepartureError::Config("watch_list is empty".to_string()));
        }
        if let Some(blank) = self.watch_list.iter().find(|icao| icao.is_empty()) {
            return Err(DepartureError::Config(format!(
                "watch_list contains a blank identifier {:?}",
                blank
            )));
        }
        let t = &self.thresholds;
        if !t.max_distance_km.is_finite() || t.max_distance_km < 0.0 {
            return Err(DepartureError::Config(format!(
                "thresholds.max_distance_km must be a non-negative number, got {}",
                t.max_distance_km
            )));
        }
        if t.elevation_margin_ft < 0 || t.max_groundspeed_kts < 0 {
            return Err(DepartureError::Config(
                "thresholds must not be negative".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(DepartureError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `BUSY_AIRPORTS_CONFIG` env var
/// 2. `/etc/busy-airports/config.toml` when `BUSY_AIRPORTS_ENV` is production
/// 3. `./busy-airports.toml`
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    match std::env::var("BUSY_AIRPORTS_ENV").as_deref() {
        Ok("production") => PathBuf::from("/etc/busy-airports/config.toml"),
        _ => PathBuf::from("./busy-airports.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::departures::RoundTripPolicy;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.watch_list.len(), 9);
        assert!(config.watch_list.contains(&"LEBL".to_string()));
        assert_eq!(config.thresholds.max_distance_km, 6.0);
        assert_eq!(config.thresholds.elevation_margin_ft, 200);
        assert_eq!(config.thresholds.max_groundspeed_kts, 50);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse(
            r#"
            watch_list = ["lebl", "LEPA", "LEBL"]
            store_path = "/tmp/refs.bin"

            [thresholds]
            max_groundspeed_kts = 30

            [policy]
            round_trip = "count"

            [server]
            port = 9090
            "#,
        )
        .unwrap();

        assert_eq!(config.watch_list, vec!["LEBL".to_string(), "LEPA".to_string()]);
        assert_eq!(config.store_path, PathBuf::from("/tmp/refs.bin"));
        assert_eq!(config.thresholds.max_groundspeed_kts, 30);
        assert_eq!(config.thresholds.max_distance_km, 6.0);
        assert_eq!(config.policy.round_trip, RoundTripPolicy::Count);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.interface, "localhost");
        assert_eq!(config.network.snapshot_url, DEFAULT_SNAPSHOT_URL);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(Config::parse("watch_list = []").is_err());
        assert!(Config::parse("[thresholds]\nmax_distance_km = -1.0").is_err());
        assert!(Config::parse("request_timeout_secs = 0").is_err());
        assert!(Config::parse("watch_list = \"LEBL\"").is_err());
    }

    #[test]
    fn test_env_override() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            API_KEY_ENV => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.airport_api.api_key.as_deref(), Some("secret"));

        let mut config = Config::default();
        config.apply_env_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.airport_api.api_key, None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy-airports.toml");
        std::fs::write(&path, "watch_list = [\"GCLP\"]\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.watch_list, vec!["GCLP".to_string()]);

        let missing = dir.path().join("missing.toml");
        assert!(Config::load(&missing).is_err());
        let defaulted = Config::load_or_default(&missing).unwrap();
        assert_eq!(defaulted.watch_list, Config::default().watch_list);
    }
}
