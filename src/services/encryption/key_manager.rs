//! Encryption Key Manager
//!
//! Registry of field-encryption keys with rotation history. Passed explicitly
//! to the components that need it; there is no process-global key state.
//!
//! Rotation never mutates an existing key: the new key is registered under a
//! fresh id and becomes current, the previous key is marked inactive with an
//! expiry timestamp and stays available for decrypting older data.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{error, info};

use super::codec::{derive_key, EncryptionCodec, KEY_SIZE};
use crate::utils::error::{AppError, AppResult};

/// Key id used by [`KeyManager::from_passphrase`]
pub const DEFAULT_KEY_ID: &str = "default";

/// Public metadata for one registered key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub key_id: String,
    pub created_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

struct KeyRecord {
    info: KeyInfo,
    codec: EncryptionCodec,
}

/// Encryption key registry
pub struct KeyManager {
    keys: DashMap<String, KeyRecord>,
    current_key_id: RwLock<Option<String>>,
}

impl KeyManager {
    /// Create an empty key manager
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            current_key_id: RwLock::new(None),
        }
    }

    /// Create a key manager whose current key is derived from `passphrase`
    pub fn from_passphrase(passphrase: &str) -> Self {
        let manager = Self::new();
        manager.insert(DEFAULT_KEY_ID, &derive_key(passphrase));
        manager.set_current(DEFAULT_KEY_ID);
        manager
    }

    /// Id of the key used for new encryptions
    pub fn current_key_id(&self) -> AppResult<String> {
        self.current_key_id
            .read()
            .map_err(|_| AppError::internal("key manager lock poisoned"))?
            .clone()
            .ok_or_else(|| AppError::not_found("No current encryption key"))
    }

    /// Register a new key. The first key registered becomes current.
    ///
    /// Fails if `key_id` is already registered or is not a valid id.
    pub fn add_key(&self, key_id: &str, key: &[u8; KEY_SIZE]) -> AppResult<()> {
        validate_key_id(key_id)?;
        if self.keys.contains_key(key_id) {
            return Err(AppError::validation(format!("Key already registered: {}", key_id)));
        }

        self.insert(key_id, key);
        let no_current = self
            .current_key_id
            .read()
            .map_err(|_| AppError::internal("key manager lock poisoned"))?
            .is_none();
        if no_current {
            self.set_current(key_id);
        }

        info!("[KeyManager] Registered key {}", key_id);
        Ok(())
    }

    /// Register `new_key_id` and make it current, retiring the previous key.
    pub fn rotate_key(&self, new_key_id: &str, new_key: &[u8; KEY_SIZE]) -> AppResult<()> {
        validate_key_id(new_key_id)?;
        if self.keys.contains_key(new_key_id) {
            return Err(AppError::validation(format!("Key already registered: {}", new_key_id)));
        }

        let mut current = self
            .current_key_id
            .write()
            .map_err(|_| AppError::internal("key manager lock poisoned"))?;

        if let Some(old_id) = current.as_deref() {
            if let Some(mut record) = self.keys.get_mut(old_id) {
                record.info.is_active = false;
                record.info.expired_at = Some(Utc::now());
            }
        }

        self.insert(new_key_id, new_key);
        let previous = current.replace(new_key_id.to_string());
        info!(
            "[KeyManager] Rotated key {} -> {}",
            previous.as_deref().unwrap_or("<none>"),
            new_key_id
        );
        Ok(())
    }

    /// Codec for a registered key, active or retired
    pub fn codec(&self, key_id: &str) -> AppResult<EncryptionCodec> {
        match self.keys.get(key_id) {
            Some(record) => Ok(record.codec.clone()),
            None => {
                error!("[KeyManager] Key not found: {}", key_id);
                Err(AppError::not_found(format!("Encryption key not found: {}", key_id)))
            }
        }
    }

    pub fn has_key(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// All keys, newest first
    pub fn key_history(&self) -> Vec<KeyInfo> {
        let mut history: Vec<KeyInfo> = self.keys.iter().map(|r| r.info.clone()).collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history
    }

    fn insert(&self, key_id: &str, key: &[u8; KEY_SIZE]) {
        self.keys.insert(
            key_id.to_string(),
            KeyRecord {
                info: KeyInfo {
                    key_id: key_id.to_string(),
                    created_at: Utc::now(),
                    expired_at: None,
                    is_active: true,
                },
                codec: EncryptionCodec::from_key(key),
            },
        );
    }

    fn set_current(&self, key_id: &str) {
        if let Ok(mut current) = self.current_key_id.write() {
            *current = Some(key_id.to_string());
        }
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Key ids prefix field blobs as `<id>:<blob>`, so they cannot contain `:`.
fn validate_key_id(key_id: &str) -> AppResult<()> {
    if key_id.is_empty() || key_id.contains(':') {
        return Err(AppError::validation(format!("Invalid key id: {:?}", key_id)));
    }
    Ok(())
}
