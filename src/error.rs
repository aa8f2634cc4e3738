//! Error taxonomy for a discovery run.
//!
//! Each enum maps to one failure class with its own blast radius:
//!
//! | Error | Raised by | Effect on the run |
//! |-------|-----------|-------------------|
//! | [`ConfigError`] | startup | fatal, reported before any fetch |
//! | [`FetchError`] | light / rendered fetch | that source contributes nothing |
//! | [`StoreError`] | dedup file | read: fatal; write: reported |
//! | [`QueueError`] | registry / queue | registry: fatal; queue write: reported |
//! | [`RunError`] | pipeline | wraps the fatal cases above |

use std::path::PathBuf;
use thiserror::Error;

/// Missing or invalid configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid URL for {name}: {value}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("failed to read rules file {path}: {source}")]
    RulesIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules file {path}: {source}")]
    RulesParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A single source could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("timed out after {0:?} while {1}")]
    Timeout(std::time::Duration, &'static str),

    #[error("empty document")]
    Empty,
}

/// Dedup state could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read seen set {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write seen set {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The source registry or the downstream queue failed.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("store rejected request (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("local sink error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl QueueError {
    /// Worth another attempt: connection-level failures, throttling and
    /// server errors. A timed-out request may already have been applied, so
    /// it is not retried.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::Network(e) => !e.is_timeout(),
            QueueError::Api { status, .. } => *status == 429 || *status >= 500,
            QueueError::Io(_) | QueueError::Serde(_) => false,
        }
    }
}

/// A run could not proceed at all.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("source registry unavailable: {0}")]
    Registry(#[source] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
