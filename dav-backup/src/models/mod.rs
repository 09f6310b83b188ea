//! Data model shared by the transport, manifest and orchestrator layers.

pub mod core_data;
pub mod result;
pub mod timestamp;
pub mod version;

pub use core_data::{AiConfig, Container, CoreData, EncryptedEnvelope, LegacyBackup, Record, Snapshot};
pub use result::{SyncDetails, SyncResult};
pub use timestamp::rfc3339;
pub use version::SchemaVersion;
