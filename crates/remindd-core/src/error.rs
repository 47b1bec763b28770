//! Core error types for remindd-core.
//!
//! This module defines the error hierarchy using thiserror. The split that
//! matters operationally: `ChannelError` never escapes the dispatcher as
//! process-fatal, while `DatabaseError::Unavailable` aborts a scheduler tick
//! and is retried on the next one.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ChannelKind;

/// Core error type for remindd-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Channel delivery errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Persistence layer unreachable (locked, disk gone). A scheduler tick
    /// aborts cleanly on this and retries on the next tick.
    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

/// Channel delivery errors, classified by retry policy.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Network failure, timeout, or remote 5xx. Retried per backoff policy
    /// up to max_attempts.
    #[error("transient channel failure: {reason}")]
    Transient { reason: String },

    /// Invalid recipient, rejected payload, remote 4xx. Short-circuits
    /// remaining retries for the channel.
    #[error("terminal channel failure: {reason}")]
    Terminal { reason: String },

    /// Reminder routes to a channel the runtime has not been configured with.
    #[error("no {kind} channel configured")]
    NotConfigured { kind: ChannelKind },
}

impl ChannelError {
    pub fn transient(reason: impl Into<String>) -> Self {
        ChannelError::Transient {
            reason: reason.into(),
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        ChannelError::Terminal {
            reason: reason.into(),
        }
    }

    /// Whether the dispatcher may retry this channel later.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Transient { .. })
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Unavailable(err.to_string())
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        // Status-code classification happens at the call site; anything that
        // surfaces as a reqwest error (connect, timeout, body) is transport.
        ChannelError::Transient {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
