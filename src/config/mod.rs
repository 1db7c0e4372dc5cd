//! Node configuration
//!
//! Loaded from a JSON file. Every key is optional; missing keys take the
//! defaults below and the result is validated before use.

mod errors;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::Severity;
use crate::plan::Sizes;

pub use errors::{ConfigError, ConfigResult};

/// Which backend new stores use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    Map,
    Lmdb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStoreConfig {
    #[serde(default)]
    pub store_type: StoreType,

    /// Result limits used when a request does not give its own
    #[serde(default = "default_sizes")]
    pub default_max_results: Vec<usize>,

    /// Children retained per parent, per depth
    #[serde(default = "default_sizes")]
    pub store_size: Vec<usize>,

    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub lmdb: LmdbConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmdbConfig {
    #[serde(default = "default_lmdb_path")]
    pub path: String,

    /// Map size of the environment
    #[serde(default = "default_max_store_size")]
    pub max_store_size_bytes: u64,

    #[serde(default = "default_max_dbs")]
    pub max_dbs: u32,

    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// Upper bound on one exported payload; 0 is unbounded
    #[serde(default)]
    pub payload_limit_bytes: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_sizes() -> Vec<usize> {
    vec![1_000_000, 100, 10, 1]
}
fn default_timeout_ms() -> u64 {
    300_000
} // 5 minutes
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_lmdb_path() -> String {
    "./searchstore-lmdb".to_string()
}
fn default_max_store_size() -> u64 {
    10 * 1024 * 1024 * 1024
} // 10GB
fn default_max_dbs() -> u32 {
    1000
}
fn default_max_readers() -> u32 {
    126
}
fn default_queue_capacity() -> usize {
    1_000_000
}
fn default_commit_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for SearchStoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            default_max_results: default_sizes(),
            store_size: default_sizes(),
            default_timeout_ms: default_timeout_ms(),
            log_level: default_log_level(),
            lmdb: LmdbConfig::default(),
        }
    }
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: default_lmdb_path(),
            max_store_size_bytes: default_max_store_size(),
            max_dbs: default_max_dbs(),
            max_readers: default_max_readers(),
            payload_limit_bytes: 0,
            queue_capacity: default_queue_capacity(),
            commit_interval_ms: default_commit_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SearchStoreConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: SearchStoreConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_max_results.contains(&0) {
            return Err(ConfigError::invalid("default_max_results", "sizes must be > 0"));
        }
        if self.store_size.contains(&0) {
            return Err(ConfigError::invalid("store_size", "sizes must be > 0"));
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::invalid("default_timeout_ms", "must be > 0"));
        }
        self.severity()?;
        self.lmdb.validate()
    }

    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::from_str(&self.log_level).map_err(|reason| ConfigError::invalid("log_level", reason))
    }

    pub fn default_max_results(&self) -> Sizes {
        Sizes::new(self.default_max_results.clone())
    }

    pub fn store_size(&self) -> Sizes {
        Sizes::new(self.store_size.clone())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl LmdbConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.path.is_empty() {
            return Err(ConfigError::invalid("lmdb.path", "must not be empty"));
        }
        if self.max_store_size_bytes == 0 {
            return Err(ConfigError::invalid("lmdb.max_store_size_bytes", "must be > 0"));
        }
        if self.max_dbs == 0 {
            return Err(ConfigError::invalid("lmdb.max_dbs", "must be > 0"));
        }
        if self.max_readers == 0 {
            return Err(ConfigError::invalid("lmdb.max_readers", "must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("lmdb.queue_capacity", "must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("lmdb.poll_interval_ms", "must be > 0"));
        }
        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn payload_limit(&self) -> Option<usize> {
        match self.payload_limit_bytes {
            0 => None,
            limit => Some(usize::try_from(limit).unwrap_or(usize::MAX)),
        }
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_object_takes_defaults() {
        let config = SearchStoreConfig::from_json("{}").unwrap();
        assert_eq!(config, SearchStoreConfig::default());
        assert_eq!(config.store_type, StoreType::Map);
        assert_eq!(config.default_timeout(), Duration::from_secs(300));
        assert_eq!(config.lmdb.payload_limit(), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"store_type": "lmdb", "store_size": [5, 2], "lmdb": {"path": "/tmp/x", "payload_limit_bytes": 4096}}"#,
        )
        .unwrap();

        let config = SearchStoreConfig::load(&path).unwrap();
        assert_eq!(config.store_type, StoreType::Lmdb);
        assert_eq!(config.store_size().size(3), 2);
        assert_eq!(config.lmdb.payload_limit(), Some(4096));
        assert_eq!(config.lmdb.max_dbs, 1000);
    }

    #[test]
    fn test_invalid_log_level() {
        let err = SearchStoreConfig::from_json(r#"{"log_level": "LOUD"}"#).unwrap_err();
        assert_eq!(err.code(), "SEARCHSTORE_CONFIG_INVALID");
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(SearchStoreConfig::from_json(r#"{"store_size": [10, 0]}"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SearchStoreConfig::load(Path::new("/nonexistent/searchstore.json")).unwrap_err();
        assert_eq!(err.code(), "SEARCHSTORE_CONFIG_READ");
    }

    #[test]
    fn test_unknown_store_type() {
        let err = SearchStoreConfig::from_json(r#"{"store_type": "redis"}"#).unwrap_err();
        assert_eq!(err.code(), "SEARCHSTORE_CONFIG_PARSE");
    }
}
