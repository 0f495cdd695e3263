//! Database Settings Store
//!
//! Settings backend for Database mode. Values are encrypted with the same
//! codec as the local files and written straight through, so `save` has
//! nothing to flush. Every statement runs through the session's
//! `ResilientConnection`.

use std::sync::Arc;

use async_trait::async_trait;
use deskkit_core::{SettingKey, SettingsBackend, StorageMode, ValueType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::database::{Connector, DbConnection};
use super::resilient::ResilientConnection;
use crate::services::encryption::EncryptionCodec;
use crate::utils::error::{AppError, AppResult};

const CREATE_SETTINGS_TABLE: &str = "CREATE TABLE IF NOT EXISTS settings (
    setting_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    user_id TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL,
    key TEXT NOT NULL,
    value_encrypted TEXT NOT NULL,
    data_type TEXT NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (scope_type, user_id, category, key)
)";

const SELECT_SETTING: &str = "SELECT value_encrypted FROM settings
    WHERE scope_type = ?1 AND user_id = ?2 AND category = ?3 AND key = ?4";

const UPSERT_SETTING: &str = "INSERT INTO settings
    (setting_id, scope_type, user_id, category, key, value_encrypted, data_type, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP)
    ON CONFLICT (scope_type, user_id, category, key) DO UPDATE SET
        value_encrypted = excluded.value_encrypted,
        data_type = excluded.data_type,
        updated_at = CURRENT_TIMESTAMP";

/// Settings table accessed through a resilient session
pub struct DatabaseSettingsStore<C: Connector> {
    connection: Arc<ResilientConnection<C>>,
    codec: Arc<EncryptionCodec>,
    cancel: CancellationToken,
}

impl<C: Connector> DatabaseSettingsStore<C> {
    /// `cancel` bounds every statement this store issues.
    pub fn new(
        connection: Arc<ResilientConnection<C>>,
        codec: Arc<EncryptionCodec>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection,
            codec,
            cancel,
        }
    }

    /// Create the settings table if missing
    pub async fn ensure_schema(&self) -> AppResult<()> {
        self.connection
            .run_with_retry(&self.cancel, |conn| {
                conn.execute_text(CREATE_SETTINGS_TABLE, &[]).map(|_| ())
            })
            .await?;
        debug!("[DatabaseSettingsStore] Settings schema ready");
        Ok(())
    }

    async fn read(&self, key: &SettingKey) -> AppResult<Option<String>> {
        let params = row_address(key);
        let blob = self
            .connection
            .run_with_retry(&self.cancel, move |conn| {
                let refs: Vec<&str> = params.iter().map(String::as_str).collect();
                conn.query_text(SELECT_SETTING, &refs)
            })
            .await?;

        let Some(blob) = blob else {
            return Ok(None);
        };
        match self.codec.decrypt(&blob) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(
                    "[DatabaseSettingsStore] Treating {}/{} as absent: {}",
                    key.category, key.key, e
                );
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &SettingKey, value: &str, value_type: ValueType) -> AppResult<()> {
        let encrypted = self.codec.encrypt(value)?;
        let [scope, user_id, category, name] = row_address(key);
        let params = [
            Uuid::new_v4().to_string(),
            scope,
            user_id,
            category,
            name,
            encrypted,
            value_type.as_str().to_string(),
        ];

        self.connection
            .run_in_transaction(&self.cancel, move |conn| {
                let refs: Vec<&str> = params.iter().map(String::as_str).collect();
                conn.execute_text(UPSERT_SETTING, &refs).map(|_| ())
            })
            .await
    }
}

/// `(scope_type, user_id, category, key)`; application rows store an empty
/// user id so the unique constraint covers them too.
fn row_address(key: &SettingKey) -> [String; 4] {
    [
        key.scope.as_str().to_string(),
        key.user_id.map(|id| id.to_string()).unwrap_or_default(),
        key.category.clone(),
        key.key.clone(),
    ]
}

#[async_trait]
impl<C: Connector> SettingsBackend for DatabaseSettingsStore<C> {
    type Error = AppError;

    fn mode(&self) -> StorageMode {
        StorageMode::Database
    }

    async fn get(&self, key: &SettingKey) -> AppResult<Option<String>> {
        key.validate()?;
        self.read(key).await
    }

    async fn set(&self, key: &SettingKey, value: &str, value_type: ValueType) -> AppResult<()> {
        key.validate()?;
        self.write(key, value, value_type).await
    }

    async fn load(&self) -> AppResult<()> {
        self.ensure_schema().await
    }

    async fn save(&self) -> AppResult<()> {
        info!("[DatabaseSettingsStore] Writes are immediate, nothing to save");
        Ok(())
    }
}
