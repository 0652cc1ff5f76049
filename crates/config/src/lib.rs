//! Settings directory for dirsync
//!
//! dirsync keeps its sync settings, API credentials and default database
//! side by side in one directory, normally `~/.config/dirsync/`. Setting
//! `DIRSYNC_CONFIG_DIR` points every lookup at another directory, which lets
//! several directory deployments run from one account.
//!
//! Call [`init`] once at startup so later saves have somewhere to land.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Directory name under the platform config root
const APP_DIR: &str = "dirsync";

/// Environment variable overriding the settings directory
pub const CONFIG_DIR_ENV: &str = "DIRSYNC_CONFIG_DIR";

/// Create the settings directory if it is missing and return it
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// The settings directory, or `None` when the platform has no config root
/// and no override is set
pub fn config_dir() -> Option<PathBuf> {
    resolve_dir(std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from))
}

fn resolve_dir(override_dir: Option<PathBuf>) -> Option<PathBuf> {
    override_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .or_else(|| dirs::config_dir().map(|root| root.join(APP_DIR)))
}

fn required_dir() -> Result<PathBuf> {
    config_dir().context("No settings directory: set DIRSYNC_CONFIG_DIR")
}

/// Full path of `filename` inside the settings directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(filename))
}

/// Whether `filename` is present in the settings directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|path| path.is_file())
}

/// Create the settings directory and any missing parents
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = required_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create settings directory {}", dir.display()))?;
    Ok(dir)
}

/// Read `filename` from the settings directory as JSON
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    load_json_file(&required_dir()?.join(filename))
}

/// Read any JSON file, naming the file in every error
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Write `value` as pretty JSON to any path
pub fn save_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut content = serde_json::to_vec_pretty(value)?;
    content.push(b'\n');
    std::fs::write(path, content).with_context(|| format!("Cannot write {}", path.display()))
}

/// Write `value` to `filename` in the settings directory, returning the path
pub fn save_json<T: Serialize>(filename: &str, value: &T) -> Result<PathBuf> {
    let path = ensure_config_dir()?.join(filename);
    save_json_file(&path, value)?;
    Ok(path)
}
