mod config;
pub mod database;

pub use config::{Config, IdentityConfig, SessionConfig, StorageBackend, StorageConfig};
pub use database::{Database, EventRecord};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/recertify[-dev]/` based on RECERTIFY_ENV.
///
/// Set RECERTIFY_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("RECERTIFY_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("recertify-dev")
    } else {
        base_dir.join("recertify")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
