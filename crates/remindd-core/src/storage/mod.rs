pub mod config;
pub mod migrations;
pub mod store;

pub use config::Config;
pub use store::ReminderStore;

use std::path::PathBuf;

/// Returns `~/.config/remindd[-dev]/` based on REMINDD_ENV.
///
/// Set REMINDD_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("REMINDD_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("remindd-dev")
    } else {
        base_dir.join("remindd")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
