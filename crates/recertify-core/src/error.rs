//! Core error types for recertify-core.
//!
//! This module defines the error hierarchy using thiserror. The session
//! coordinator itself never surfaces errors to its owner (forced logout is
//! the universal recovery), so these mostly come from the storage, config
//! and login layers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for recertify-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Credential store errors
    #[error("Credential store error: {0}")]
    Credential(#[from] CredentialError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Credential store errors.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The OS keyring rejected the operation
    #[error("Keyring error for '{key}': {source}")]
    Keyring {
        key: String,
        #[source]
        source: keyring::Error,
    },

    /// The SQLite-backed store failed
    #[error("Credential database error: {0}")]
    Database(#[from] DatabaseError),

    /// A stored value could not be decoded
    #[error("Malformed credential '{key}': {message}")]
    Malformed { key: String, message: String },
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

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// No usable data directory
    #[error("Cannot determine data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Warning lead time must leave room before expiry
    #[error("warning lead time ({lead_secs}s) must be shorter than the session budget ({budget_secs}s)")]
    LeadExceedsBudget { lead_secs: u64, budget_secs: u64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Required login field missing
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
