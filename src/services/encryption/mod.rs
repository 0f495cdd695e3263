//! Encryption
//!
//! Encryption at rest for everything this crate persists:
//! - `codec` - passphrase-derived AES-256-GCM blobs
//! - `key_manager` - explicit key registry with rotation
//! - `field` - allow-listed field encryption for JSON records

pub mod codec;
pub mod field;
pub mod key_manager;

pub use codec::{decrypt, encrypt, generate_key, EncryptionCodec};
pub use field::{FieldEncryptionPolicy, FieldEncryptor};
pub use key_manager::{KeyInfo, KeyManager};
