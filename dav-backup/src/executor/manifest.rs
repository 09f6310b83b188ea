//! Manifest types for incremental backup support.
//!
//! The manifest is the source of truth for what the remote holds: the
//! fingerprint of the core document and one entry per uploaded asset. It is
//! serialized as `manifest.json` under the backup root and always rewritten
//! whole, after every data and asset transfer of a run has been decided.

use crate::models::{timestamp, SchemaVersion};
use crate::transport::{DavClient, Fetched, WebDavConfig};
use crate::utils::errors::{Result, SyncError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub version: SchemaVersion,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Fingerprint of the core document exactly as uploaded.
    pub data_hash: String,
    #[serde(default)]
    pub images: IndexMap<String, AssetEntry>,
    #[serde(default)]
    pub encrypted: bool,
}

/// Metadata for a single uploaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEntry {
    pub hash: String,
    /// Length of the base64 text.
    pub size: u64,
    #[serde(with = "crate::models::timestamp")]
    pub uploaded_at: DateTime<Utc>,
}

impl BackupManifest {
    /// Manifest for the run that just finished. `createdAt` survives from the
    /// previous manifest, if there was one.
    pub fn next(
        previous: Option<&BackupManifest>,
        data_hash: String,
        images: IndexMap<String, AssetEntry>,
        encrypted: bool,
    ) -> Self {
        let now = timestamp::now();
        Self {
            version: SchemaVersion::CURRENT,
            created_at: previous.map_or(now, |m| m.created_at),
            updated_at: now,
            data_hash,
            images,
            encrypted,
        }
    }

    /// Whether the asset `name` was uploaded with fingerprint `hash`.
    pub fn has_asset(&self, name: &str, hash: &str) -> bool {
        self.images.get(name).is_some_and(|e| e.hash == hash)
    }
}

/// Reads and writes the manifest at a fixed URL.
pub struct ManifestStore<'a> {
    client: &'a DavClient,
    url: String,
}

impl<'a> ManifestStore<'a> {
    pub fn new(client: &'a DavClient, url: String) -> Self {
        Self { client, url }
    }

    /// Fetch the current manifest.
    ///
    /// A missing manifest and an unparsable one both yield `None`, which
    /// makes the caller treat the remote as empty. Transport and auth
    /// errors are returned.
    pub async fn load(&self, config: &WebDavConfig) -> Result<Option<BackupManifest>> {
        let body = match self.client.get(&self.url, config).await? {
            Fetched::Found(body) => body,
            Fetched::NotFound => {
                debug!("No manifest at {}", self.url);
                return Ok(None);
            }
        };

        match serde_json::from_str::<BackupManifest>(&body) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                let err = SyncError::ManifestCorrupt(e.to_string());
                warn!("{}, treating remote as empty", err);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, config: &WebDavConfig, manifest: &BackupManifest) -> Result<()> {
        let body = serde_json::to_string_pretty(manifest)?;
        self.client.put(&self.url, config, body).await?;
        debug!("Manifest written: {} assets", manifest.images.len());
        Ok(())
    }
}
