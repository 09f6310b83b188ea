//! Content fingerprints and payload encryption.

pub mod crypto;
pub mod hash;
