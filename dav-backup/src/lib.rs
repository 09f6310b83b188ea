//! Backup Library
//!
//! Incremental, content-addressed backup and sync of a local record store
//! against a WebDAV remote. Unchanged documents and assets are detected by
//! fingerprint and never re-sent; the core document can be encrypted with a
//! password.

pub mod config;
pub mod executor;
pub mod models;
pub mod security;
pub mod store;
pub mod sync;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupManifest, SyncEngine, SyncOptions};
pub use models::{SyncDetails, SyncResult};
pub use transport::WebDavConfig;
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
