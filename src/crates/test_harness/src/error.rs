use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Failures of the orchestration machinery itself. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("failed to scan {path}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("cannot locate {component} support library: {reason}")]
    SupportLocation {
        component: &'static str,
        reason: String,
    },
    #[error("toolchain library not found at {0}")]
    MissingLibrary(PathBuf),
    #[error("failed to create output directory {path}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl HarnessError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        HarnessError::Config(message.into())
    }

    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        HarnessError::Pattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading or validating a [`RunConfig`](crate::RunConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config file {0} exceeds the size limit")]
    TooLarge(PathBuf),
    #[error("config file {0} is not valid utf-8")]
    Encoding(PathBuf),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("malformed override `{0}` (expected KEY=VALUE)")]
    Override(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
