//! Settings Facade
//!
//! Typed read/write of application and user settings, routed to whichever
//! backend the resolved storage mode selected.
//!
//! Values are stored as canonical text: strings verbatim, everything else as
//! JSON. Reads that find nothing, or text that does not convert to the
//! requested type, return the caller's default.

use std::sync::Arc;

use deskkit_core::{SettingKey, SettingsBackend, StorageMode, ValueType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::utils::error::{AppError, AppResult};

/// Backend handle shared by every facade user
pub type SharedBackend = Arc<dyn SettingsBackend<Error = AppError>>;

/// Typed settings access over the selected backend
#[derive(Clone)]
pub struct SettingsFacade {
    backend: SharedBackend,
}

impl SettingsFacade {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Mode of the backend this facade routes to
    pub fn storage_mode(&self) -> StorageMode {
        self.backend.mode()
    }

    /// Read an application setting, or `default` when absent or unconvertible
    pub async fn get<T: DeserializeOwned>(&self, category: &str, key: &str, default: T) -> T {
        self.read(&SettingKey::app(category, key), default).await
    }

    pub async fn set<T: Serialize + ?Sized>(&self, category: &str, key: &str, value: &T) -> AppResult<()> {
        self.write(&SettingKey::app(category, key), value).await
    }

    /// Read a setting owned by `user_id`
    pub async fn get_user<T: DeserializeOwned>(
        &self,
        user_id: Uuid,
        category: &str,
        key: &str,
        default: T,
    ) -> T {
        self.read(&SettingKey::user(user_id, category, key), default).await
    }

    pub async fn set_user<T: Serialize + ?Sized>(
        &self,
        user_id: Uuid,
        category: &str,
        key: &str,
        value: &T,
    ) -> AppResult<()> {
        self.write(&SettingKey::user(user_id, category, key), value).await
    }

    /// Raw canonical text of a setting, without conversion
    pub async fn get_raw(&self, key: &SettingKey) -> AppResult<Option<String>> {
        self.backend.get(key).await
    }

    /// Refresh from the backing store
    pub async fn load(&self) -> AppResult<()> {
        self.backend.load().await
    }

    /// Persist pending changes
    pub async fn save(&self) -> AppResult<()> {
        self.backend.save().await
    }

    async fn read<T: DeserializeOwned>(&self, key: &SettingKey, default: T) -> T {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                warn!(
                    "[SettingsFacade] Read of {}/{} failed, using default: {}",
                    key.category, key.key, e
                );
                return default;
            }
        };

        match decode_value(&raw) {
            Some(value) => value,
            None => {
                debug!(
                    "[SettingsFacade] {}/{} does not convert to the requested type",
                    key.category, key.key
                );
                default
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &SettingKey, value: &T) -> AppResult<()> {
        let (text, value_type) = encode_value(value)?;
        self.backend.set(key, &text, value_type).await
    }
}

/// Canonical text and declared type for `value`. Strings are stored
/// verbatim, everything else (including `null`) as JSON.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> AppResult<(String, ValueType)> {
    let json = serde_json::to_value(value)?;
    let value_type = ValueType::of(&json);
    let text = match json {
        Value::String(s) => s,
        other => serde_json::to_string(&other)?,
    };
    Ok((text, value_type))
}

/// Convert canonical text back to `T`.
///
/// Text is parsed as JSON first and read as a verbatim string only when that
/// fails. Text opening with a quote can only have come from a verbatim
/// string, since no other JSON value encodes that way, so it is tried as a
/// string first.
pub fn decode_value<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let as_text = || serde_json::from_value(Value::String(raw.to_string())).ok();
    let as_json = || serde_json::from_str(raw).ok();
    if raw.starts_with('"') {
        as_text().or_else(as_json)
    } else {
        as_json().or_else(as_text)
    }
}
