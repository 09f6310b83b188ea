//! The single-document backup format that predates the manifest layout.
//!
//! One JSON file holds the core document with every asset inline. When a
//! password is set the core document is encrypted, while assets and the
//! export timestamp stay in the clear next to the ciphertext.

use crate::models::{rfc3339, CoreData, EncryptedEnvelope, LegacyBackup, SchemaVersion};
use crate::sync::crypto;
use crate::transport::{DavClient, Fetched, RemoteLayout, WebDavConfig};
use crate::utils::errors::{Result, SyncError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

/// What the remote says about its legacy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteInfo {
    Missing,
    /// Present; `None` when it carries no readable `exportedAt`.
    Present(Option<DateTime<Utc>>),
}

/// Serialize `core` plus inline assets in the legacy layout.
pub fn encode(
    core: &CoreData,
    images: Option<IndexMap<String, String>>,
    password: Option<&str>,
) -> Result<String> {
    let mut core = core.clone();
    core.version = SchemaVersion::LEGACY;

    let Some(password) = password else {
        return Ok(serde_json::to_string_pretty(&LegacyBackup { core, images })?);
    };

    let exported_at = rfc3339(core.exported_at);
    let blob = crypto::encrypt(&serde_json::to_string(&core)?, password)?;
    let envelope = EncryptedEnvelope {
        images,
        exported_at: Some(exported_at),
        ..EncryptedEnvelope::new(blob)
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse a legacy document into a migrated core document and its assets.
pub fn decode(raw: &str, password: Option<&str>) -> Result<(CoreData, IndexMap<String, String>)> {
    let value: Value = serde_json::from_str(raw)?;

    let Some(envelope) = EncryptedEnvelope::detect(&value) else {
        let backup: LegacyBackup = serde_json::from_value(value)?;
        return Ok(backup.into_parts());
    };

    let password = password.ok_or(SyncError::PasswordRequired)?;
    let plaintext = crypto::decrypt(&envelope.data, password)?;
    let core: CoreData = serde_json::from_str(&plaintext)?;
    Ok((core.migrate(), envelope.images.unwrap_or_default()))
}

/// Read only the export timestamp of the remote legacy document.
///
/// An unparsable document is reported as missing. Transport and auth
/// errors are returned so a flaky link never reads as "nothing there".
pub async fn probe(client: &DavClient, layout: &RemoteLayout, config: &WebDavConfig) -> Result<RemoteInfo> {
    let raw = match client.get(&layout.legacy_url(), config).await? {
        Fetched::Found(raw) => raw,
        Fetched::NotFound => return Ok(RemoteInfo::Missing),
    };

    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Remote legacy backup is not valid JSON: {}", e);
            return Ok(RemoteInfo::Missing);
        }
    };

    let exported_at = value
        .get("exportedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    Ok(RemoteInfo::Present(exported_at))
}
