//! Local Key-Value Store
//!
//! File-backed settings for Local mode. Application settings live in
//! `settings_app.json` and per-user settings in `settings_user.json`, both as
//! `{ category: { key: EncryptedBlob } }`. User categories are namespaced by
//! owner as `<user id>/<category>`.
//!
//! Reads and writes hit the in-memory snapshot; nothing touches disk until
//! `save`. Values that fail to decrypt read as absent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use deskkit_core::{SettingKey, SettingScope, SettingsBackend, StorageMode, ValueType};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::encryption::EncryptionCodec;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{app_settings_path, user_settings_path, write_atomic};

/// `category -> key -> EncryptedBlob`
type SettingsMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Default, Clone)]
struct Snapshot {
    app: SettingsMap,
    user: SettingsMap,
}

/// Encrypted JSON settings files
pub struct LocalKeyValueStore {
    app_path: PathBuf,
    user_path: PathBuf,
    codec: Arc<EncryptionCodec>,
    snapshot: RwLock<Snapshot>,
    io_lock: Mutex<()>,
}

impl LocalKeyValueStore {
    /// Store rooted in the application data directory
    pub fn new(data_dir: &Path, codec: Arc<EncryptionCodec>) -> Self {
        Self::with_paths(app_settings_path(data_dir), user_settings_path(data_dir), codec)
    }

    pub fn with_paths(app_path: PathBuf, user_path: PathBuf, codec: Arc<EncryptionCodec>) -> Self {
        Self {
            app_path,
            user_path,
            codec,
            snapshot: RwLock::new(Snapshot::default()),
            io_lock: Mutex::new(()),
        }
    }

    /// Replace the in-memory snapshot with the files on disk.
    ///
    /// Missing or malformed files load as empty. Only I/O failures are
    /// errors, and those leave the current snapshot untouched.
    pub async fn load(&self) -> AppResult<()> {
        let _io = self.io_lock.lock().await;
        let app = read_settings_or_empty(&self.app_path).await?;
        let user = read_settings_or_empty(&self.user_path).await?;

        debug!(
            "[LocalKeyValueStore] Loaded {} app and {} user categories",
            app.len(),
            user.len()
        );
        *self.snapshot.write().await = Snapshot { app, user };
        Ok(())
    }

    /// Write both files from the current snapshot.
    pub async fn save(&self) -> AppResult<()> {
        let _io = self.io_lock.lock().await;
        let snapshot = self.snapshot.read().await.clone();

        write_atomic(&self.app_path, &serde_json::to_vec_pretty(&snapshot.app)?).await?;
        write_atomic(&self.user_path, &serde_json::to_vec_pretty(&snapshot.user)?).await?;

        info!("[LocalKeyValueStore] Settings saved");
        Ok(())
    }

    /// Check both files parse, without touching the snapshot
    pub async fn verify_files(&self) -> AppResult<()> {
        let _io = self.io_lock.lock().await;
        read_settings_file(&self.app_path).await?;
        read_settings_file(&self.user_path).await?;
        Ok(())
    }

    pub async fn get_app(&self, category: &str, key: &str) -> Option<String> {
        let blob = {
            let snapshot = self.snapshot.read().await;
            snapshot.app.get(category)?.get(key)?.clone()
        };
        self.open_blob(&blob, category, key)
    }

    pub async fn set_app(&self, category: &str, key: &str, value: &str) -> AppResult<()> {
        let blob = self.codec.encrypt(value)?;
        let mut snapshot = self.snapshot.write().await;
        snapshot
            .app
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), blob);
        Ok(())
    }

    pub async fn get_user(&self, user_id: Uuid, category: &str, key: &str) -> Option<String> {
        let scoped = user_category(user_id, category);
        let blob = {
            let snapshot = self.snapshot.read().await;
            snapshot.user.get(&scoped)?.get(key)?.clone()
        };
        self.open_blob(&blob, &scoped, key)
    }

    pub async fn set_user(
        &self,
        user_id: Uuid,
        category: &str,
        key: &str,
        value: &str,
    ) -> AppResult<()> {
        let blob = self.codec.encrypt(value)?;
        let mut snapshot = self.snapshot.write().await;
        snapshot
            .user
            .entry(user_category(user_id, category))
            .or_default()
            .insert(key.to_string(), blob);
        Ok(())
    }

    fn open_blob(&self, blob: &str, category: &str, key: &str) -> Option<String> {
        match self.codec.decrypt(blob) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    "[LocalKeyValueStore] Treating {}/{} as absent: {}",
                    category, key, e
                );
                None
            }
        }
    }
}

fn user_category(user_id: Uuid, category: &str) -> String {
    format!("{}/{}", user_id, category)
}

async fn read_settings_or_empty(path: &Path) -> AppResult<SettingsMap> {
    match read_settings_file(path).await {
        Err(AppError::Config(msg)) => {
            warn!("[LocalKeyValueStore] {}; loading as empty", msg);
            Ok(SettingsMap::new())
        }
        other => other,
    }
}

async fn read_settings_file(path: &Path) -> AppResult<SettingsMap> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(SettingsMap::new());
    }
    let content = tokio::fs::read(path).await?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(SettingsMap::new());
    }
    serde_json::from_slice(&content).map_err(|e| {
        AppError::config(format!("Malformed settings file {}: {}", path.display(), e))
    })
}

#[async_trait]
impl SettingsBackend for LocalKeyValueStore {
    type Error = AppError;

    fn mode(&self) -> StorageMode {
        StorageMode::Local
    }

    async fn get(&self, key: &SettingKey) -> AppResult<Option<String>> {
        key.validate()?;
        match (key.scope, key.user_id) {
            (SettingScope::User, Some(user_id)) => {
                Ok(self.get_user(user_id, &key.category, &key.key).await)
            }
            _ => Ok(self.get_app(&key.category, &key.key).await),
        }
    }

    async fn set(&self, key: &SettingKey, value: &str, _value_type: ValueType) -> AppResult<()> {
        key.validate()?;
        match (key.scope, key.user_id) {
            (SettingScope::User, Some(user_id)) => {
                self.set_user(user_id, &key.category, &key.key, value).await
            }
            _ => self.set_app(&key.category, &key.key, value).await,
        }
    }

    async fn load(&self) -> AppResult<()> {
        LocalKeyValueStore::load(self).await
    }

    async fn save(&self) -> AppResult<()> {
        LocalKeyValueStore::save(self).await
    }
}
