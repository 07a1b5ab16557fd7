//! Dashboard configuration management.
//!
//! Configuration is stored at `~/.config/igms-dashboard/config.json` and
//! falls back to defaults when the file is absent. `IGMS_*` environment
//! variables override individual fields (see [`Config::apply_env`]).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{ReloadPolicy, DEFAULT_SESSION_KEY};
use crate::storage::{FileStorage, MemoryStorage, SessionStorage};

/// Application name used for config/storage directory paths
const APP_NAME: &str = "igms-dashboard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default simulated latency of the mock profile fetch
const DEFAULT_HYDRATION_DELAY_MS: u64 = 1000;

/// Default simulated latency of the mock statistics backend
const DEFAULT_STATISTICS_LATENCY_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMedium {
    /// Lives as long as the process, like a browser tab
    #[default]
    Memory,
    /// JSON files under the storage directory
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageMedium,
    /// Overrides the platform cache directory for `StorageMedium::File`
    pub storage_dir: Option<PathBuf>,
    pub session_key: String,
    pub reload_policy: ReloadPolicy,
    /// Default freshness window for cached statistics; none means until logout
    pub cache_ttl_secs: Option<u64>,
    pub session_lifetime_minutes: Option<i64>,
    pub hydration_delay_ms: u64,
    pub statistics_latency_ms: u64,
    /// Use a REST backend instead of the mock statistics source
    pub statistics_url: Option<String>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageMedium::default(),
            storage_dir: None,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            reload_policy: ReloadPolicy::default(),
            cache_ttl_secs: None,
            session_lifetime_minutes: None,
            hydration_delay_ms: DEFAULT_HYDRATION_DELAY_MS,
            statistics_latency_ms: DEFAULT_STATISTICS_LATENCY_MS,
            statistics_url: None,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_json(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from `IGMS_*` variables provided by `lookup`.
    /// Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("IGMS_STORAGE") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.storage = StorageMedium::Memory,
                "file" => self.storage = StorageMedium::File,
                _ => warn!(value = %v, "Unknown IGMS_STORAGE, keeping {:?}", self.storage),
            }
        }
        if let Some(v) = lookup("IGMS_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("IGMS_SESSION_KEY") {
            self.session_key = v;
        }
        if let Some(v) = lookup("IGMS_RELOAD_POLICY") {
            match v.to_ascii_lowercase().as_str() {
                "reload" => self.reload_policy = ReloadPolicy::Reload,
                "notify" => self.reload_policy = ReloadPolicy::Notify,
                "disabled" => self.reload_policy = ReloadPolicy::Disabled,
                _ => warn!(value = %v, "Unknown IGMS_RELOAD_POLICY, keeping {:?}", self.reload_policy),
            }
        }
        if let Some(secs) = parse_var(&lookup, "IGMS_CACHE_TTL_SECS") {
            self.cache_ttl_secs = Some(secs);
        }
        if let Some(minutes) = parse_var(&lookup, "IGMS_SESSION_LIFETIME_MINUTES") {
            self.session_lifetime_minutes = Some(minutes);
        }
        if let Some(ms) = parse_var(&lookup, "IGMS_HYDRATION_DELAY_MS") {
            self.hydration_delay_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "IGMS_STATISTICS_LATENCY_MS") {
            self.statistics_latency_ms = ms;
        }
        if let Some(v) = lookup("IGMS_STATISTICS_URL") {
            self.statistics_url = Some(v);
        }
        if let Some(v) = lookup("IGMS_LAST_USERNAME") {
            self.last_username = Some(v);
        }
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs
            .map(|secs| Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)))
    }

    pub fn session_lifetime(&self) -> Option<Duration> {
        self.session_lifetime_minutes
            .map(|minutes| Duration::minutes(minutes.clamp(0, i64::MAX / 60_000)))
    }

    pub fn hydration_delay(&self) -> StdDuration {
        StdDuration::from_millis(self.hydration_delay_ms)
    }

    pub fn statistics_latency(&self) -> StdDuration {
        StdDuration::from_millis(self.statistics_latency_ms)
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Open the configured storage medium.
    pub fn open_storage(&self) -> Result<Arc<dyn SessionStorage>> {
        let storage: Arc<dyn SessionStorage> = match self.storage {
            StorageMedium::Memory => Arc::new(MemoryStorage::new()),
            StorageMedium::File => Arc::new(FileStorage::new(self.storage_dir()?)?),
        };
        Ok(storage)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(value = %raw, "Invalid {}, ignoring", name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage, StorageMedium::Memory);
        assert_eq!(config.session_key, "igms.session");
        assert_eq!(config.reload_policy, ReloadPolicy::Reload);
        assert_eq!(config.cache_ttl(), None);
        assert_eq!(config.hydration_delay(), StdDuration::from_secs(1));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = Config::from_json(r#"{"storage":"file","cache_ttl_secs":120,"reload_policy":"notify"}"#).unwrap();
        assert_eq!(config.storage, StorageMedium::File);
        assert_eq!(config.reload_policy, ReloadPolicy::Notify);
        assert_eq!(config.cache_ttl(), Some(Duration::minutes(2)));
        assert_eq!(config.session_key, DEFAULT_SESSION_KEY);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(Config::from_json("{storage: file}").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("IGMS_STORAGE", "FILE"),
            ("IGMS_STORAGE_DIR", "/tmp/igms"),
            ("IGMS_RELOAD_POLICY", "disabled"),
            ("IGMS_CACHE_TTL_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage, StorageMedium::File);
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/igms")));
        assert_eq!(config.reload_policy, ReloadPolicy::Disabled);
        assert_eq!(config.cache_ttl_secs, None);
    }

    #[test]
    fn test_env_overrides_numeric_fields() {
        let env: HashMap<&str, &str> = [
            ("IGMS_SESSION_LIFETIME_MINUTES", "45"),
            ("IGMS_HYDRATION_DELAY_MS", " 0 "),
            ("IGMS_STATISTICS_LATENCY_MS", "-5"),
            ("IGMS_CACHE_TTL_SECS", "90"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.session_lifetime(), Some(Duration::minutes(45)));
        assert_eq!(config.hydration_delay(), StdDuration::ZERO);
        assert_eq!(config.statistics_latency_ms, DEFAULT_STATISTICS_LATENCY_MS);
        assert_eq!(config.cache_ttl(), Some(Duration::seconds(90)));
    }

    #[test]
    fn test_open_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage: StorageMedium::File,
            storage_dir: Some(dir.path().join("store")),
            ..Config::default()
        };
        let storage = config.open_storage().unwrap();
        storage.set("k", "v").unwrap();
        assert!(dir.path().join("store/k.json").exists());
    }
}
