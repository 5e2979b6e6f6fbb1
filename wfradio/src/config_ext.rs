//! Radio settings stored in `wfconfig`
//!
//! The trait [`WildflowerConfigExt`] adds typed accessors for the `radio.*`
//! subtree of `config.yaml` to [`wfconfig::Config`]:
//!
//! ```yaml
//! radio:
//!   api:
//!     base_url: https://wildflower-radio-zj59.onrender.com
//!     positions_path: /getAllTrackInformation
//!     stations_path: /getAllStations
//!     timeout_secs: 10
//!   sync:
//!     poll_interval_ms: 1000
//!     progress_interval_ms: 200
//!     buffer_seconds: 3.0
//!     drift_tolerance_seconds: 1.0
//!     predictive_window_seconds: 0.5
//!   storage:
//!     root: Tracks
//! ```
//!
//! Getters persist the default when a key is missing, so the file always
//! shows every knob.
//!
//! # Example
//!
//! ```no_run
//! use wfconfig::get_config;
//! use wfradio::WildflowerConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! let settings = config.get_sync_settings()?;
//! println!("Polling every {:?}", settings.poll_interval);
//! # Ok(())
//! # }
//! ```

use crate::client::ClientBuilder;
use crate::constants::{
    BUFFER_SECONDS, DEFAULT_BASE_URL, DEFAULT_POSITIONS_PATH, DEFAULT_STATIONS_PATH,
    DEFAULT_TIMEOUT_SECS, DRIFT_TOLERANCE_SECONDS, POLL_INTERVAL_MS, PREDICTIVE_WINDOW_SECONDS,
    PROGRESS_INTERVAL_MS,
};
use crate::models::StationInfo;
use crate::segment_address::DEFAULT_STORAGE_ROOT;
use crate::synchronizer::SyncSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wfconfig::Config;

/// Default TTL for the station directory cache (1 day in seconds)
pub const DEFAULT_STATION_CACHE_TTL_SECS: u64 = 24 * 3600;

const BASE_URL: &[&str] = &["radio", "api", "base_url"];
const POSITIONS_PATH: &[&str] = &["radio", "api", "positions_path"];
const STATIONS_PATH: &[&str] = &["radio", "api", "stations_path"];
const TIMEOUT_SECS: &[&str] = &["radio", "api", "timeout_secs"];
const POLL_MS: &[&str] = &["radio", "sync", "poll_interval_ms"];
const PROGRESS_MS: &[&str] = &["radio", "sync", "progress_interval_ms"];
const BUFFER: &[&str] = &["radio", "sync", "buffer_seconds"];
const DRIFT: &[&str] = &["radio", "sync", "drift_tolerance_seconds"];
const WINDOW: &[&str] = &["radio", "sync", "predictive_window_seconds"];
const STORAGE_ROOT: &[&str] = &["radio", "storage", "root"];
const STATION_CACHE: &[&str] = &["radio", "station_cache"];
const STATION_CACHE_TTL: &[&str] = &["radio", "station_cache_ttl_secs"];

/// Stations are kept as JSON text: `config.yaml` keys are lower-cased on load,
/// which would mangle the camelCase fields of the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedStations {
    stations: String,
    last_updated: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extension trait for the Wildflower radio settings
pub trait WildflowerConfigExt {
    // ========================================================================
    // Endpoints
    // ========================================================================

    fn get_radio_base_url(&self) -> Result<String>;
    fn set_radio_base_url(&self, url: &str) -> Result<()>;

    fn get_radio_positions_path(&self) -> Result<String>;
    fn get_radio_stations_path(&self) -> Result<String>;

    /// HTTP timeout in seconds
    fn get_radio_timeout_secs(&self) -> Result<u64>;

    /// Client builder preset with every endpoint setting
    fn position_client_builder(&self) -> Result<ClientBuilder>;

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Storage root marker used by segment addresses
    fn get_storage_root(&self) -> Result<String>;

    /// Every synchronization tunable at once
    ///
    /// Negative values are clamped to 0 and zero intervals to 1 ms.
    fn get_sync_settings(&self) -> Result<SyncSettings>;

    fn set_sync_settings(&self, settings: &SyncSettings) -> Result<()>;

    // ========================================================================
    // Station directory cache
    // ========================================================================

    /// Cached station directory, or `None` when missing or older than the TTL
    fn get_cached_stations(&self) -> Result<Option<Vec<StationInfo>>>;

    fn set_cached_stations(&self, stations: &[StationInfo]) -> Result<()>;

    fn get_station_cache_ttl(&self) -> Result<u64>;

    fn set_station_cache_ttl(&self, ttl_secs: u64) -> Result<()>;

    /// Drop the cached directory, forcing the next listing to hit the network
    fn clear_station_cache(&self) -> Result<()>;
}

/// Read a string, persisting `default` when the key is missing
fn string_or_persist(config: &Config, path: &[&str], default: &str) -> Result<String> {
    match config.get_value(path) {
        Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        _ => {
            config.set_value(path, Value::String(default.to_string()))?;
            Ok(default.to_string())
        }
    }
}

fn u64_or_persist(config: &Config, path: &[&str], default: u64) -> Result<u64> {
    if config.get_value(path).is_err() {
        config.set_u64(path, default)?;
        return Ok(default);
    }
    Ok(config.get_u64_or(path, default))
}

fn f64_or_persist(config: &Config, path: &[&str], default: f64) -> Result<f64> {
    if config.get_value(path).is_err() {
        config.set_f64(path, default)?;
        return Ok(default);
    }
    Ok(config.get_f64_or(path, default))
}

impl WildflowerConfigExt for Config {
    fn get_radio_base_url(&self) -> Result<String> {
        string_or_persist(self, BASE_URL, DEFAULT_BASE_URL)
    }

    fn set_radio_base_url(&self, url: &str) -> Result<()> {
        self.set_value(BASE_URL, Value::String(url.to_string()))
    }

    fn get_radio_positions_path(&self) -> Result<String> {
        string_or_persist(self, POSITIONS_PATH, DEFAULT_POSITIONS_PATH)
    }

    fn get_radio_stations_path(&self) -> Result<String> {
        string_or_persist(self, STATIONS_PATH, DEFAULT_STATIONS_PATH)
    }

    fn get_radio_timeout_secs(&self) -> Result<u64> {
        u64_or_persist(self, TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS)
    }

    fn position_client_builder(&self) -> Result<ClientBuilder> {
        Ok(ClientBuilder::new()
            .base_url(self.get_radio_base_url()?)
            .positions_path(self.get_radio_positions_path()?)
            .stations_path(self.get_radio_stations_path()?)
            .timeout(Duration::from_secs(self.get_radio_timeout_secs()?)))
    }

    fn get_storage_root(&self) -> Result<String> {
        string_or_persist(self, STORAGE_ROOT, DEFAULT_STORAGE_ROOT)
    }

    fn get_sync_settings(&self) -> Result<SyncSettings> {
        let poll_ms = u64_or_persist(self, POLL_MS, POLL_INTERVAL_MS)?.max(1);
        let progress_ms = u64_or_persist(self, PROGRESS_MS, PROGRESS_INTERVAL_MS)?.max(1);

        Ok(SyncSettings {
            poll_interval: Duration::from_millis(poll_ms),
            progress_interval: Duration::from_millis(progress_ms),
            buffer_seconds: f64_or_persist(self, BUFFER, BUFFER_SECONDS)?.max(0.0),
            drift_tolerance_seconds: f64_or_persist(self, DRIFT, DRIFT_TOLERANCE_SECONDS)?
                .max(0.0),
            predictive_window_seconds: f64_or_persist(self, WINDOW, PREDICTIVE_WINDOW_SECONDS)?
                .max(0.0),
        })
    }

    fn set_sync_settings(&self, settings: &SyncSettings) -> Result<()> {
        self.set_u64(POLL_MS, settings.poll_interval.as_millis() as u64)?;
        self.set_u64(PROGRESS_MS, settings.progress_interval.as_millis() as u64)?;
        self.set_f64(BUFFER, settings.buffer_seconds)?;
        self.set_f64(DRIFT, settings.drift_tolerance_seconds)?;
        self.set_f64(WINDOW, settings.predictive_window_seconds)
    }

    fn get_cached_stations(&self) -> Result<Option<Vec<StationInfo>>> {
        let ttl = self.get_station_cache_ttl()?;

        match self.get_value(STATION_CACHE) {
            Ok(Value::Null) | Err(_) => Ok(None),
            Ok(value) => {
                let cached: CachedStations = serde_yaml::from_value(value)?;
                if unix_now().saturating_sub(cached.last_updated) < ttl {
                    Ok(Some(serde_json::from_str(&cached.stations)?))
                } else {
                    tracing::debug!("Station cache expired");
                    Ok(None)
                }
            }
        }
    }

    fn set_cached_stations(&self, stations: &[StationInfo]) -> Result<()> {
        let cached = CachedStations {
            stations: serde_json::to_string(stations)?,
            last_updated: unix_now(),
        };
        self.set_value(STATION_CACHE, serde_yaml::to_value(&cached)?)
    }

    fn get_station_cache_ttl(&self) -> Result<u64> {
        u64_or_persist(self, STATION_CACHE_TTL, DEFAULT_STATION_CACHE_TTL_SECS)
    }

    fn set_station_cache_ttl(&self, ttl_secs: u64) -> Result<()> {
        self.set_u64(STATION_CACHE_TTL, ttl_secs)
    }

    fn clear_station_cache(&self) -> Result<()> {
        self.set_value(STATION_CACHE, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_default_settings() {
        let (_dir, config) = config();
        assert_eq!(config.get_sync_settings().unwrap(), SyncSettings::default());
        assert_eq!(config.get_radio_base_url().unwrap(), DEFAULT_BASE_URL);
        assert_eq!(config.get_storage_root().unwrap(), "Tracks");
    }

    #[test]
    fn test_settings_round_trip_through_file() {
        let (dir, config) = config();
        let settings = SyncSettings {
            buffer_seconds: 1.5,
            predictive_window_seconds: 0.0,
            poll_interval: Duration::from_millis(500),
            ..SyncSettings::default()
        };
        config.set_sync_settings(&settings).unwrap();

        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(reloaded.get_sync_settings().unwrap(), settings);
    }

    #[test]
    fn test_negative_values_are_clamped() {
        let (_dir, config) = config();
        config.set_f64(BUFFER, -2.0).unwrap();
        config.set_u64(POLL_MS, 0).unwrap();

        let settings = config.get_sync_settings().unwrap();
        assert_eq!(settings.buffer_seconds, 0.0);
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_missing_keys_are_persisted() {
        let (_dir, config) = config();
        config
            .set_value(&["radio"], Value::Mapping(serde_yaml::Mapping::new()))
            .unwrap();

        assert_eq!(config.get_radio_timeout_secs().unwrap(), DEFAULT_TIMEOUT_SECS);
        assert_eq!(
            config.get_value(TIMEOUT_SECS).unwrap().as_u64(),
            Some(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_station_cache() {
        let (_dir, config) = config();
        assert!(config.get_cached_stations().unwrap().is_none());

        let stations = vec![StationInfo {
            name: "Radio Wildflower".into(),
            description: "Wildflower's one and only radio station!".into(),
            logo: None,
            track_list: None,
        }];
        config.set_cached_stations(&stations).unwrap();
        assert_eq!(config.get_cached_stations().unwrap(), Some(stations.clone()));

        config.set_station_cache_ttl(0).unwrap();
        assert!(config.get_cached_stations().unwrap().is_none());

        config.set_station_cache_ttl(DEFAULT_STATION_CACHE_TTL_SECS).unwrap();
        config.clear_station_cache().unwrap();
        assert!(config.get_cached_stations().unwrap().is_none());
    }
}
