//! Field-Level Encryption
//!
//! Encrypts selected fields of JSON records. Which fields are protected is an
//! explicit allow-list (`type name -> field names`) supplied as configuration.
//!
//! Field blobs are formatted `<key id>:<EncryptedBlob>` so they stay
//! decryptable after key rotation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::key_manager::KeyManager;
use crate::utils::error::{AppError, AppResult};

/// Allow-list of encrypted fields per record type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldEncryptionPolicy {
    fields: HashMap<String, BTreeSet<String>>,
}

impl FieldEncryptionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `fields` of `type_name` as encrypted
    pub fn allow<I, S>(mut self, type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .entry(type_name.into())
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn is_encrypted(&self, type_name: &str, field: &str) -> bool {
        self.fields
            .get(type_name)
            .map(|set| set.contains(field))
            .unwrap_or(false)
    }

    fn fields_for(&self, type_name: &str) -> impl Iterator<Item = &String> {
        self.fields.get(type_name).into_iter().flatten()
    }
}

/// Field encryption service
pub struct FieldEncryptor {
    keys: Arc<KeyManager>,
    policy: FieldEncryptionPolicy,
}

impl FieldEncryptor {
    pub fn new(keys: Arc<KeyManager>, policy: FieldEncryptionPolicy) -> Self {
        Self { keys, policy }
    }

    pub fn policy(&self) -> &FieldEncryptionPolicy {
        &self.policy
    }

    /// Encrypt one value with `key_id`, or the current key when `None`.
    pub fn encrypt(&self, plaintext: &str, key_id: Option<&str>) -> AppResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let key_id = match key_id {
            Some(id) => id.to_string(),
            None => self.keys.current_key_id()?,
        };
        let blob = self.keys.codec(&key_id)?.encrypt(plaintext)?;
        Ok(format!("{}:{}", key_id, blob))
    }

    /// Decrypt a `<key id>:<blob>` value with whichever key produced it.
    pub fn decrypt(&self, value: &str) -> AppResult<String> {
        if value.is_empty() {
            return Ok(String::new());
        }
        let (key_id, blob) = value
            .split_once(':')
            .ok_or_else(|| AppError::crypto("Invalid field ciphertext: missing key id"))?;
        self.keys.codec(key_id)?.decrypt(blob)
    }

    /// Encrypt the allow-listed string fields of `record` in place.
    pub fn encrypt_record(&self, type_name: &str, record: &mut Value) -> AppResult<()> {
        let Some(object) = record.as_object_mut() else {
            return Err(AppError::validation(format!("{} record is not a JSON object", type_name)));
        };

        for field in self.policy.fields_for(type_name) {
            match object.get_mut(field) {
                Some(Value::String(text)) if !text.is_empty() => {
                    *text = self.encrypt(text, None)?;
                }
                Some(Value::String(_)) | Some(Value::Null) | None => {}
                Some(_) => {
                    warn!(
                        "[FieldEncryptor] {}.{} is not a string field, left unencrypted",
                        type_name, field
                    );
                }
            }
        }
        Ok(())
    }

    /// Decrypt the allow-listed fields of `record` in place.
    ///
    /// Values without a registered key prefix are treated as already plain.
    pub fn decrypt_record(&self, type_name: &str, record: &mut Value) -> AppResult<()> {
        let Some(object) = record.as_object_mut() else {
            return Err(AppError::validation(format!("{} record is not a JSON object", type_name)));
        };

        for field in self.policy.fields_for(type_name) {
            if let Some(Value::String(text)) = object.get_mut(field) {
                let is_cipher = text
                    .split_once(':')
                    .map(|(id, _)| self.keys.has_key(id))
                    .unwrap_or(false);
                if is_cipher {
                    *text = self.decrypt(text)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::encryption::key_manager::DEFAULT_KEY_ID;
    use serde_json::json;

    fn encryptor() -> FieldEncryptor {
        let keys = Arc::new(KeyManager::from_passphrase("field-pass"));
        let policy = FieldEncryptionPolicy::new()
            .allow("User", ["email", "phone"])
            .allow("AuditLog", ["details"]);
        FieldEncryptor::new(keys, policy)
    }

    #[test]
    fn test_value_carries_key_id() {
        let enc = encryptor();
        let value = enc.encrypt("alice@example.com", None).unwrap();
        assert!(value.starts_with("default:"));
        assert_eq!(enc.decrypt(&value).unwrap(), "alice@example.com");
    }

    #[test]
    fn test_decrypt_without_prefix_fails() {
        let enc = encryptor();
        assert!(matches!(enc.decrypt("no-prefix"), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_record_only_touches_allow_list() {
        let enc = encryptor();
        let mut user = json!({
            "name": "Alice",
            "email": "alice@example.com",
            "phone": "",
            "age": 30
        });

        enc.encrypt_record("User", &mut user).unwrap();
        assert_eq!(user["name"], "Alice");
        assert_ne!(user["email"], "alice@example.com");
        assert_eq!(user["phone"], "");
        assert_eq!(user["age"], 30);

        enc.decrypt_record("User", &mut user).unwrap();
        assert_eq!(user["email"], "alice@example.com");
    }

    #[test]
    fn test_unknown_type_is_untouched() {
        let enc = encryptor();
        let mut record = json!({"email": "x@example.com"});
        enc.encrypt_record("Notification", &mut record).unwrap();
        assert_eq!(record["email"], "x@example.com");
    }

    #[test]
    fn test_plain_values_survive_decrypt() {
        let enc = encryptor();
        let mut log = json!({"details": "plain text: not encrypted"});
        enc.decrypt_record("AuditLog", &mut log).unwrap();
        assert_eq!(log["details"], "plain text: not encrypted");
    }

    #[test]
    fn test_decrypt_after_rotation() {
        let keys = Arc::new(KeyManager::from_passphrase("field-pass"));
        let enc = FieldEncryptor::new(
            keys.clone(),
            FieldEncryptionPolicy::new().allow("User", ["email"]),
        );
        let mut user = json!({"email": "old@example.com"});
        enc.encrypt_record("User", &mut user).unwrap();

        keys.rotate_key("k2", &[5u8; 32]).unwrap();
        let fresh = enc.encrypt("new@example.com", None).unwrap();
        assert!(fresh.starts_with("k2:"));

        enc.decrypt_record("User", &mut user).unwrap();
        assert_eq!(user["email"], "old@example.com");
        assert!(keys.has_key(DEFAULT_KEY_ID));
    }

    #[test]
    fn test_policy_from_config_json() {
        let policy: FieldEncryptionPolicy =
            serde_json::from_str(r#"{"User": ["email"], "Setting": ["value"]}"#).unwrap();
        assert!(policy.is_encrypted("User", "email"));
        assert!(policy.is_encrypted("Setting", "value"));
        assert!(!policy.is_encrypted("User", "name"));
    }

    #[test]
    fn test_non_object_record_rejected() {
        let enc = encryptor();
        let mut value = json!(["email"]);
        assert!(enc.encrypt_record("User", &mut value).is_err());
    }
}
