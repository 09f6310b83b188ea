//! Content fingerprints for change detection.
//!
//! A fingerprint is the SHA-256 digest of the payload, hex encoded and
//! truncated to [`FINGERPRINT_LEN`] characters. It is only used to decide
//! whether a remote copy is stale, never as a content address.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 16;

/// Fingerprint a byte or text payload.
///
/// # Example
///
/// ```
/// use dav_backup::sync::hash::fingerprint;
///
/// let a = fingerprint("hello");
/// assert_eq!(a.len(), 16);
/// assert_eq!(a, fingerprint(b"hello"));
/// ```
pub fn fingerprint(payload: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(payload.as_ref());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}
