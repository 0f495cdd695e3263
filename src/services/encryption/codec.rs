//! Encryption Codec
//!
//! Passphrase-based encryption for data at rest.
//!
//! Blobs are base64-encoded `nonce[12] || ciphertext_with_tag`. The key is
//! derived once per codec with PBKDF2-HMAC-SHA256 over a fixed application
//! salt, so the same passphrase always yields the same key and a blob is
//! self-contained given only the passphrase.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::utils::error::{AppError, AppResult};

const PBKDF2_ITERATIONS: u32 = 10_000;
const KEY_SALT: &[u8] = b"DeskAppKit-Salt-2024";
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

/// Derive the 256-bit key for `passphrase`
pub fn derive_key(passphrase: &str) -> [u8; KEY_SIZE] {
    let mut derived_key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KEY_SALT, PBKDF2_ITERATIONS, &mut derived_key);
    derived_key
}

/// Generate a random 256-bit key, base64-encoded
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}

/// Symmetric codec bound to one derived key
#[derive(Clone)]
pub struct EncryptionCodec {
    cipher: Aes256Gcm,
}

impl EncryptionCodec {
    /// Derive the key from `passphrase` and build a codec around it
    pub fn new(passphrase: &str) -> Self {
        Self::from_key(&derive_key(passphrase))
    }

    /// Build a codec around raw key material
    pub fn from_key(key: &[u8; KEY_SIZE]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt `plaintext` into an `EncryptedBlob`.
    ///
    /// The empty string passes through unchanged.
    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::crypto(format!("Encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypt an `EncryptedBlob` produced by [`EncryptionCodec::encrypt`].
    ///
    /// Fails with `AppError::Crypto` for non-base64 input, truncated blobs,
    /// a wrong key, or tampered ciphertext. Never returns partial plaintext.
    pub fn decrypt(&self, blob: &str) -> AppResult<String> {
        if blob.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64
            .decode(blob.trim())
            .map_err(|e| AppError::crypto(format!("Base64 decode failed: {}", e)))?;

        if data.len() <= NONCE_SIZE + TAG_SIZE {
            return Err(AppError::crypto("Invalid encrypted data: too short"));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::crypto("Decryption failed: wrong key or corrupted data"))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::crypto(format!("Decrypted data is not valid UTF-8: {}", e)))
    }
}

impl fmt::Debug for EncryptionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionCodec { .. }")
    }
}

/// Encrypt `plaintext` with a key derived from `passphrase`
pub fn encrypt(plaintext: &str, passphrase: &str) -> AppResult<String> {
    EncryptionCodec::new(passphrase).encrypt(plaintext)
}

/// Decrypt `blob` with a key derived from `passphrase`
pub fn decrypt(blob: &str, passphrase: &str) -> AppResult<String> {
    EncryptionCodec::new(passphrase).decrypt(blob)
}
