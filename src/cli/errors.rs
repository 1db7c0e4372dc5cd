//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::coprocessor::CoprocessorError;
use crate::plan::PlanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (files, stdout)
    IoError,
    /// Malformed settings or input rows
    InvalidInput,
    /// Stores could not be built or fed
    SearchFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "SEARCHSTORE_CLI_CONFIG_ERROR",
            Self::IoError => "SEARCHSTORE_CLI_IO_ERROR",
            Self::InvalidInput => "SEARCHSTORE_CLI_INVALID_INPUT",
            Self::SearchFailed => "SEARCHSTORE_CLI_SEARCH_FAILED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    pub fn search_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::SearchFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(format!("{} ({})", e, e.code()))
    }
}

impl From<PlanError> for CliError {
    fn from(e: PlanError) -> Self {
        Self::invalid_input(format!("{} ({})", e, e.code()))
    }
}

impl From<CoprocessorError> for CliError {
    fn from(e: CoprocessorError) -> Self {
        Self::search_failed(format!("{} ({})", e, e.code()))
    }
}

pub type CliResult<T> = Result<T, CliError>;
