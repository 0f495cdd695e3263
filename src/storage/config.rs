//! Runtime Configuration
//!
//! Reads and writes `deskkit.json`, the non-secret tuning file (retry policy,
//! probe timeout). Loaded once at startup.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::models::settings::RuntimeConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::runtime_config_path;

/// Configuration service for runtime tuning
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: RuntimeConfig,
}

impl ConfigService {
    /// Load `deskkit.json` from `data_dir`, writing defaults if it is missing.
    pub fn new(data_dir: &Path) -> AppResult<Self> {
        fs::create_dir_all(data_dir)?;

        let config_path = runtime_config_path(data_dir);
        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let default_config = RuntimeConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            info!("[ConfigService] Wrote default config to {}", config_path.display());
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Like [`ConfigService::new`], but an invalid file falls back to defaults
    /// instead of failing startup.
    pub fn load_or_default(data_dir: &Path) -> Self {
        match Self::new(data_dir) {
            Ok(service) => service,
            Err(e) => {
                warn!("[ConfigService] Using default config: {}", e);
                Self {
                    config_path: runtime_config_path(data_dir),
                    config: RuntimeConfig::default(),
                }
            }
        }
    }

    fn load_from_file(path: &Path) -> AppResult<RuntimeConfig> {
        let content = fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    fn save_to_file(path: &Path, config: &RuntimeConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Replace the configuration and persist it
    pub fn update(&mut self, config: RuntimeConfig) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &config)?;
        self.config = config;
        Ok(())
    }
}
