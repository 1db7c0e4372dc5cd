//! Configuration errors

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read(_) => "SEARCHSTORE_CONFIG_READ",
            ConfigError::Parse(_) => "SEARCHSTORE_CONFIG_PARSE",
            ConfigError::Invalid { .. } => "SEARCHSTORE_CONFIG_INVALID",
        }
    }
}
