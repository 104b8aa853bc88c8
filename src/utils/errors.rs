use std::path::PathBuf;
use thiserror::Error;

use crate::api::coingecko::ApiError;

/// Failure to obtain a price from the upstream source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("Malformed price data for {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Failure to deliver an alert notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook rejected notification ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Notification transport failed: {0}")]
    Transport(String),
}

/// Invalid configuration or alert rule
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },
    #[error("Failed to read rules file {path}: {source}")]
    RulesIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse rules: {0}")]
    RulesParse(#[from] serde_json::Error),
    #[error("Invalid alert rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("{0}")]
    Usage(String),
}

/// Failure to persist the local price cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
