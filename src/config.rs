//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::db::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_MAX_RANGE_DAYS};

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

/// Store-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How long a writer waits for the lock before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".tasknest/tasks.db")
}

fn default_busy_timeout() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Statistics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Longest date range a statistics query may cover.
    #[serde(default = "default_max_range_days")]
    pub max_range_days: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            max_range_days: default_max_range_days(),
        }
    }
}

fn default_max_range_days() -> i64 {
    DEFAULT_MAX_RANGE_DAYS
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files, highest priority first.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var("TASKNEST_CONFIG_PATH") {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from(".tasknest/config.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".tasknest/config.yaml"));
        }
        paths
    }

    /// Load configuration from default locations or return defaults,
    /// then apply environment overrides.
    pub fn load_or_default() -> Self {
        let mut config = Self::candidate_paths()
            .into_iter()
            .find_map(|path| {
                let loaded = Self::load(&path).ok()?;
                debug!(path = %path.display(), "loaded config");
                Some(loaded)
            })
            .unwrap_or_default();

        config.apply_env();
        config
    }

    /// Apply `TASKNEST_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var("TASKNEST_DB_PATH") {
            self.store.db_path = PathBuf::from(db_path);
        }

        if let Ok(timeout) = std::env::var("TASKNEST_BUSY_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                self.store.busy_timeout_ms = timeout;
            }
        }

        if let Ok(days) = std::env::var("TASKNEST_MAX_RANGE_DAYS") {
            if let Ok(days) = days.parse() {
                self.stats.max_range_days = days;
            }
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.store.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
