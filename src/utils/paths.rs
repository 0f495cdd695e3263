//! Cross-Platform Path Utilities
//!
//! Resolves the DeskKit data directory and the well-known files inside it.
//! The directory defaults to `~/.deskkit/` and can be overridden with the
//! `DESKKIT_DATA_DIR` environment variable.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "DESKKIT_DATA_DIR";

/// Encrypted bootstrap database descriptor
pub const BOOTSTRAP_FILE: &str = "bootstrap_db.json";

/// Application-scope local settings
pub const APP_SETTINGS_FILE: &str = "settings_app.json";

/// User-scope local settings
pub const USER_SETTINGS_FILE: &str = "settings_user.json";

/// Non-secret runtime configuration
pub const RUNTIME_CONFIG_FILE: &str = "deskkit.json";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the DeskKit data directory (`$DESKKIT_DATA_DIR` or `~/.deskkit/`)
pub fn data_dir() -> AppResult<PathBuf> {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => Ok(home_dir()?.join(".deskkit")),
    }
}

/// Path of the bootstrap descriptor inside `dir`
pub fn bootstrap_path(dir: &Path) -> PathBuf {
    dir.join(BOOTSTRAP_FILE)
}

/// Path of the application-scope settings file inside `dir`
pub fn app_settings_path(dir: &Path) -> PathBuf {
    dir.join(APP_SETTINGS_FILE)
}

/// Path of the user-scope settings file inside `dir`
pub fn user_settings_path(dir: &Path) -> PathBuf {
    dir.join(USER_SETTINGS_FILE)
}

/// Path of the runtime configuration file inside `dir`
pub fn runtime_config_path(dir: &Path) -> PathBuf {
    dir.join(RUNTIME_CONFIG_FILE)
}

/// Ensure a directory exists, creating it if necessary
pub async fn ensure_dir(path: &Path) -> AppResult<()> {
    if !tokio::fs::try_exists(path).await? {
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Replace `path` with `contents` without exposing a half-written file.
///
/// Writes a sibling temp file, then renames it over the target.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent).await?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| AppError::config(format!("Not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
