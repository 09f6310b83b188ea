//! Error taxonomy for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed (HTTP {status}), check username and password")]
    Auth { status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} {reason}")]
    Http { status: u16, reason: String },

    #[error("Remote manifest is corrupt: {0}")]
    ManifestCorrupt(String),

    #[error("Decryption failed, the password may be wrong")]
    DecryptionFailed,

    #[error("Backup is encrypted, a password is required to decrypt it")]
    PasswordRequired,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Failed to transfer asset {name}: {reason}")]
    PartialAssetFailure { name: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Local store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session is locked")]
    Locked,
}

impl SyncError {
    /// Failures of the local persistence layer. These escape the public
    /// sync entry points as `Err`; everything else becomes a failed
    /// `SyncResult`.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, SyncError::Store(_) | SyncError::Io(_))
    }

    /// HTTP status carried by the error, if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Auth { status } | SyncError::Http { status, .. } => Some(*status),
            SyncError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
