//! Password based encryption of the core backup payload.
//!
//! Blob layout (base64 encoded):
//!
//! ```text
//! salt (16 bytes) || nonce (12 bytes) || ciphertext + GCM tag
//! ```
//!
//! The key is derived with PBKDF2-HMAC-SHA256 from the password and the
//! per-blob salt. Asset files never pass through here; they are stored as
//! plain base64 regardless of the encryption setting.

use crate::utils::errors::{Result, SyncError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Derive a 256-bit key from a password and salt.
pub fn derive_key(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt `plaintext` under a key derived from `password`.
///
/// A fresh salt and nonce are drawn for every call, so encrypting the same
/// payload twice yields different blobs.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String> {
    let salt = random_bytes::<SALT_LEN>();
    let nonce = random_bytes::<NONCE_LEN>();
    let key = derive_key(password, &salt);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| SyncError::Encryption(format!("invalid key: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| SyncError::Encryption("AES-GCM encryption failed".to_string()))?;

    let mut combined = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&salt);
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Malformed input, a wrong password and a tampered blob all surface as
/// [`SyncError::DecryptionFailed`].
pub fn decrypt(blob: &str, password: &str) -> Result<String> {
    let combined = BASE64
        .decode(blob.trim())
        .map_err(|_| SyncError::DecryptionFailed)?;

    if combined.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(SyncError::DecryptionFailed);
    }

    let (salt, rest) = combined.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    let key = derive_key(password, salt);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SyncError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SyncError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| SyncError::DecryptionFailed)
}
