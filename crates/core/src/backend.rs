//! Settings Backend Trait
//!
//! String-level storage contract shared by the local file store and the
//! database-backed store. Typed access (serialization, defaults) lives one
//! layer up in the settings facade, so backends only ever see canonical text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::mode::{SettingScope, StorageMode};

/// Fully-qualified address of one setting.
///
/// `(scope, user_id, category, key)` is unique across a backend. `user_id` is
/// required iff the scope is `User`; use the constructors to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingKey {
    pub scope: SettingScope,
    pub user_id: Option<Uuid>,
    pub category: String,
    pub key: String,
}

impl SettingKey {
    /// Address an application-wide setting
    pub fn app(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scope: SettingScope::Application,
            user_id: None,
            category: category.into(),
            key: key.into(),
        }
    }

    /// Address a setting owned by one user
    pub fn user(user_id: Uuid, category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scope: SettingScope::User,
            user_id: Some(user_id),
            category: category.into(),
            key: key.into(),
        }
    }

    /// Check the scope/owner pairing and that category and key are non-empty.
    pub fn validate(&self) -> CoreResult<()> {
        match (self.scope, self.user_id) {
            (SettingScope::Application, Some(_)) => {
                return Err(CoreError::validation("application setting must not carry a user id"))
            }
            (SettingScope::User, None) => {
                return Err(CoreError::validation("user setting requires a user id"))
            }
            _ => {}
        }
        if self.category.is_empty() {
            return Err(CoreError::validation("setting category is empty"));
        }
        if self.key.is_empty() {
            return Err(CoreError::validation("setting key is empty"));
        }
        Ok(())
    }
}

/// Declared type of a stored value, kept next to the value for diagnostics
/// and for the database `data_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Bool,
    Number,
    Json,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::Number => "number",
            ValueType::Json => "json",
        }
    }

    /// Tag for an already-serialized JSON value
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(_) => ValueType::String,
            serde_json::Value::Bool(_) => ValueType::Bool,
            serde_json::Value::Number(_) => ValueType::Number,
            _ => ValueType::Json,
        }
    }
}

/// Storage contract implemented by the Local and Database settings stores.
///
/// Backends encrypt values at rest themselves; callers hand over and receive
/// plaintext canonical text.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Error type surfaced by this backend
    type Error: std::error::Error + Send + Sync + 'static;

    /// Mode this backend serves
    fn mode(&self) -> StorageMode;

    /// Read one value. Absent and undecipherable values both read as `None`.
    async fn get(&self, key: &SettingKey) -> Result<Option<String>, Self::Error>;

    /// Write one value, replacing any previous value at the same address.
    async fn set(&self, key: &SettingKey, value: &str, value_type: ValueType) -> Result<(), Self::Error>;

    /// Refresh state from the underlying storage.
    async fn load(&self) -> Result<(), Self::Error>;

    /// Persist pending state to the underlying storage.
    async fn save(&self) -> Result<(), Self::Error>;
}
