//! Master password and field-level encryption.
//!
//! A [`Session`] owns the unlocked key; callers hold one and pass it to
//! [`encrypt_text`]/[`decrypt_text`] instead of consulting global state.
//! [`JsonSettingsStore`](crate::store::JsonSettingsStore) takes one to keep
//! the stored AI API key sealed at rest.
//! Encrypted fields look like `ENC::<base64(nonce || tag || ciphertext)>`.

use crate::sync::crypto::{derive_key, random_bytes, KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::utils::errors::{Result, SyncError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

const PREFIX: &str = "ENC::";
const TAG_LEN: usize = 16;

/// What gets persisted for a configured master password: the salt and the
/// derived key, both base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPasswordRecord {
    pub salt: String,
    pub hash: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecurityStatus {
    pub configured: bool,
    pub unlocked: bool,
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Default)]
pub struct Session {
    unlocked_key: Option<Key>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a new master password. The session is unlocked with it.
    pub fn set_master_password(&mut self, password: &str) -> MasterPasswordRecord {
        let salt = random_bytes::<SALT_LEN>();
        let key = derive_key(password, &salt);
        self.unlocked_key = Some(Key(key));
        debug!("Master password set");
        MasterPasswordRecord {
            salt: BASE64.encode(salt),
            hash: BASE64.encode(key),
        }
    }

    /// Unlock when `password` derives the stored key. A malformed record
    /// never unlocks.
    pub fn unlock(&mut self, record: &MasterPasswordRecord, password: &str) -> bool {
        let (Ok(salt), Ok(stored)) = (BASE64.decode(&record.salt), BASE64.decode(&record.hash)) else {
            warn!("Stored master password record is not valid base64");
            return false;
        };

        let derived = derive_key(password, &salt);
        if !constant_time_eq(&derived, &stored) {
            return false;
        }
        self.unlocked_key = Some(Key(derived));
        true
    }

    pub fn lock(&mut self) {
        self.unlocked_key = None;
    }

    pub fn active_key(&self) -> Option<&Key> {
        self.unlocked_key.as_ref()
    }

    pub fn status(&self, record: Option<&MasterPasswordRecord>) -> SecurityStatus {
        SecurityStatus {
            configured: record.is_some(),
            unlocked: self.unlocked_key.is_some(),
        }
    }
}

fn cipher(session: &Session) -> Result<Aes256Gcm> {
    let key = session.active_key().ok_or(SyncError::Locked)?;
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| SyncError::Encryption(e.to_string()))
}

pub fn is_encrypted(text: &str) -> bool {
    text.starts_with(PREFIX)
}

pub fn encrypt_text(plain: &str, session: &Session) -> Result<String> {
    let cipher = cipher(session)?;
    let nonce = random_bytes::<NONCE_LEN>();
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
        .map_err(|_| SyncError::Encryption("AES-GCM encryption failed".to_string()))?;

    // aes-gcm appends the tag; the field format wants it before the ciphertext.
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(tag);
    payload.extend_from_slice(ciphertext);
    Ok(format!("{PREFIX}{}", BASE64.encode(payload)))
}

/// Text without the `ENC::` prefix is returned unchanged.
pub fn decrypt_text(data: &str, session: &Session) -> Result<String> {
    let Some(encoded) = data.strip_prefix(PREFIX) else {
        return Ok(data.to_string());
    };
    let cipher = cipher(session)?;

    let payload = BASE64.decode(encoded).map_err(|_| SyncError::DecryptionFailed)?;
    if payload.len() < NONCE_LEN + TAG_LEN {
        return Err(SyncError::DecryptionFailed);
    }
    let (nonce, rest) = payload.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut sealed = Vec::with_capacity(rest.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), sealed.as_slice())
        .map_err(|_| SyncError::DecryptionFailed)?;
    String::from_utf8(plain).map_err(|_| SyncError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_cycle() {
        let mut session = Session::new();
        let record = session.set_master_password("open sesame");
        assert!(session.active_key().is_some());

        session.lock();
        assert_eq!(session.status(Some(&record)), SecurityStatus { configured: true, unlocked: false });

        assert!(!session.unlock(&record, "wrong"));
        assert!(session.active_key().is_none());
        assert!(session.unlock(&record, "open sesame"));
        assert!(session.status(Some(&record)).unlocked);
        assert_eq!(Session::new().status(None), SecurityStatus { configured: false, unlocked: false });
    }

    #[test]
    fn test_malformed_record_never_unlocks() {
        let mut session = Session::new();
        let record = MasterPasswordRecord {
            salt: "!!!".to_string(),
            hash: "AAAA".to_string(),
        };
        assert!(!session.unlock(&record, "anything"));
    }

    #[test]
    fn test_field_round_trip() {
        let mut session = Session::new();
        session.set_master_password("pw");

        let sealed = encrypt_text("api-key-123", &session).unwrap();
        assert!(sealed.starts_with("ENC::"));
        assert_eq!(decrypt_text(&sealed, &session).unwrap(), "api-key-123");

        let raw = BASE64.decode(&sealed[5..]).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + TAG_LEN + "api-key-123".len());
    }

    #[test]
    fn test_locked_session() {
        let mut session = Session::new();
        session.set_master_password("pw");
        let sealed = encrypt_text("x", &session).unwrap();
        session.lock();

        assert!(matches!(encrypt_text("x", &session), Err(SyncError::Locked)));
        assert!(matches!(decrypt_text(&sealed, &session), Err(SyncError::Locked)));
        assert_eq!(decrypt_text("plain text", &session).unwrap(), "plain text");
    }

    #[test]
    fn test_other_key_cannot_decrypt() {
        let mut a = Session::new();
        a.set_master_password("one");
        let mut b = Session::new();
        b.set_master_password("two");

        let sealed = encrypt_text("hidden", &a).unwrap();
        assert!(matches!(decrypt_text(&sealed, &b), Err(SyncError::DecryptionFailed)));
        assert!(matches!(decrypt_text("ENC::AAAA", &a), Err(SyncError::DecryptionFailed)));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let mut session = Session::new();
        session.set_master_password("pw");
        assert_eq!(format!("{:?}", session.active_key().unwrap()), "Key(<redacted>)");
    }
}
