//! Home-based storage paths.
//!
//! Everything lives under `~/.compile-session/`:
//! - `config.yaml` - user configuration
//! - `logs/` - per-session JSONL event logs
//!
//! `COMPILE_SESSION_HOME` replaces the whole directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

const HOME_DIR_NAME: &str = ".compile-session";

pub const HOME_ENV: &str = "COMPILE_SESSION_HOME";

/// Returns the storage directory, creating it if needed.
pub fn home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(HOME_DIR_NAME),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the config file path. The file itself may not exist.
pub fn config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join("config.yaml"))
}

/// Returns the event log directory, creating it if needed.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}
