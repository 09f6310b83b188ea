//! Sync executor - orchestrates backup and restore against the remote store.
//!
//! Incremental upload walks the phases of [`Phase`] in order: the previous
//! manifest is fetched, the core document is uploaded or skipped by
//! fingerprint, each referenced asset is uploaded or skipped the same way,
//! and only then is the new manifest committed. An asset that failed to
//! land is never recorded as freshly uploaded.
//!
//! Every public operation returns a [`SyncResult`]. Only local persistence
//! failures escape as `Err`.

pub mod direction;
pub mod legacy;
pub mod manifest;
pub mod phase;

pub use direction::Direction;
pub use legacy::RemoteInfo;
pub use manifest::{AssetEntry, BackupManifest, ManifestStore};
pub use phase::Phase;

use crate::models::{rfc3339, timestamp, AiConfig, CoreData, EncryptedEnvelope, SyncDetails, SyncResult};
use crate::store::{LocalStore, SettingsStore};
use crate::sync::{crypto, hash};
use crate::transport::layout::{DEFAULT_LEGACY_FILENAME, DEFAULT_ROOT_DIR};
use crate::transport::{DavClient, Fetched, RemoteLayout, WebDavConfig};
use crate::utils::errors::{Result, SyncError};
use indexmap::IndexMap;
use phase::Run;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-call sync settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub include_images: bool,
    pub encryption_password: Option<String>,
    /// Manifest layout when set, single legacy document otherwise.
    pub incremental: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            encryption_password: None,
            incremental: true,
        }
    }
}

impl SyncOptions {
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.encryption_password = Some(password.into());
        self
    }

    /// An empty password means no encryption.
    fn password(&self) -> Option<&str> {
        self.encryption_password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Settings store reads are best effort: a failure leaves that part out of
/// the backup instead of failing it.
fn tolerate<T>(what: &str, result: Result<Option<T>>) -> Option<T> {
    result.unwrap_or_else(|e| {
        warn!("Could not read {}: {}", what, e);
        None
    })
}

pub struct SyncEngine {
    client: DavClient,
    store: Arc<dyn LocalStore>,
    settings: Arc<dyn SettingsStore>,
    root_dir: String,
    legacy_filename: String,
}

impl SyncEngine {
    pub fn new(client: DavClient, store: Arc<dyn LocalStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            client,
            store,
            settings,
            root_dir: DEFAULT_ROOT_DIR.to_string(),
            legacy_filename: DEFAULT_LEGACY_FILENAME.to_string(),
        }
    }

    /// Override the backup directory and legacy document names.
    pub fn with_remote_names(mut self, root_dir: impl Into<String>, legacy_filename: impl Into<String>) -> Self {
        self.root_dir = root_dir.into();
        self.legacy_filename = legacy_filename.into();
        self
    }

    fn layout(&self, config: &WebDavConfig) -> Result<RemoteLayout> {
        RemoteLayout::new(&config.url, &self.root_dir, &self.legacy_filename)
    }

    /// Depth-0 property query against the configured URL.
    pub async fn test_connection(&self, config: &WebDavConfig) -> SyncResult {
        match self.client.probe(&config.url, config).await {
            Ok(resp) if resp.is_success() => {
                info!("Connection to {} OK ({})", config.url, resp.status);
                SyncResult::ok("Connection successful")
            }
            Ok(resp) if resp.status == 401 => {
                warn!("Connection to {} rejected credentials", config.url);
                SyncResult::failure("Authentication failed, check username and password")
            }
            Ok(resp) => {
                warn!("Connection to {} failed: {} {}", config.url, resp.status, resp.status_text);
                SyncResult::failure(format!("Connection failed: {} {}", resp.status, resp.status_text))
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", config.url, e);
                SyncResult::failure(format!("Connection failed: {e}"))
            }
        }
    }

    /// Incremental upload, or a legacy single-document upload when
    /// `options.incremental` is off.
    pub async fn upload(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        if options.incremental {
            self.incremental_upload(config, options).await
        } else {
            self.legacy_upload(config, options).await
        }
    }

    /// Incremental download (which itself falls back to the legacy document
    /// when no manifest exists), or a legacy download when
    /// `options.incremental` is off.
    pub async fn download(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        if options.incremental {
            self.incremental_download(config, options).await
        } else {
            self.legacy_download(config, options).await
        }
    }

    /// Startup/timer entry point.
    pub async fn auto_sync(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        self.bidirectional_sync(config, options).await
    }

    pub async fn incremental_upload(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let mut run = Run::start("Incremental upload");
        let outcome = self.try_incremental_upload(&mut run, config, options).await;
        run.finish(outcome)
    }

    pub async fn incremental_download(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let mut run = Run::start("Incremental download");
        let outcome = self.try_incremental_download(&mut run, config, options).await;
        run.finish(outcome)
    }

    pub async fn legacy_upload(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let run = Run::start("Upload");
        let outcome = self.try_legacy_upload(config, options).await;
        run.finish(outcome)
    }

    pub async fn legacy_download(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let run = Run::start("Download");
        let outcome = self.try_legacy_download(config, options).await;
        run.finish(outcome)
    }

    /// Last-writer-wins: compare the newest local change with the remote
    /// legacy document's export time and move data the other way.
    ///
    /// Only the legacy document is consulted for the remote side. With
    /// `options.incremental` set (the default) the upload branch writes the
    /// manifest layout and leaves the legacy document alone, so every later
    /// call decides "upload" again and never reports "Already in sync".
    pub async fn bidirectional_sync(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let run = Run::start("Sync");
        let outcome = self.try_bidirectional_sync(config, options).await;
        run.finish(outcome)
    }

    /// The current remote manifest, if any.
    pub async fn remote_status(&self, config: &WebDavConfig) -> Result<Option<BackupManifest>> {
        let layout = self.layout(config)?;
        ManifestStore::new(&self.client, layout.manifest_url()).load(config).await
    }

    async fn try_incremental_upload(
        &self,
        run: &mut Run,
        config: &WebDavConfig,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let layout = self.layout(config)?;
        self.client.ensure_directory(&layout.root_url(), config).await?;
        if options.include_images {
            self.client.ensure_directory(&layout.images_url(), config).await?;
        }

        let core = self.build_core_data().await?;
        let body = encode_core(&core, options.password())?;
        let data_hash = hash::fingerprint(&body);

        let manifests = ManifestStore::new(&self.client, layout.manifest_url());
        let previous = manifests.load(config).await?;
        run.advance(Phase::ManifestFetched);

        let mut details = SyncDetails::default();
        if previous.as_ref().is_some_and(|m| m.data_hash == data_hash) {
            info!("Skipped {} (unchanged)", layout.data_url());
            details.skipped += 1;
        } else {
            self.client.put(&layout.data_url(), config, body).await?;
            info!("Uploaded {} ({})", layout.data_url(), data_hash);
            details.uploaded += 1;
        }
        run.advance(Phase::DataDecided);

        let mut images = IndexMap::new();
        let mut failed = 0usize;
        if options.include_images {
            for name in core.asset_names() {
                let prior = previous.as_ref().and_then(|m| m.images.get(&name)).cloned();
                let content = match self.read_local_asset(&name).await? {
                    LocalAsset::Readable(content) => content,
                    LocalAsset::Missing => continue,
                    LocalAsset::Rejected => {
                        failed += 1;
                        if let Some(entry) = prior {
                            images.insert(name, entry);
                        }
                        continue;
                    }
                };
                let asset_hash = hash::fingerprint(&content);

                if previous.as_ref().is_some_and(|m| m.has_asset(&name, &asset_hash)) {
                    debug!("Skipped asset {} (unchanged)", name);
                    details.skipped += 1;
                    if let Some(entry) = prior {
                        images.insert(name, entry);
                    }
                    continue;
                }

                let size = content.len() as u64;
                match self.client.put(&layout.asset_url(&name), config, content).await {
                    Ok(()) => {
                        info!("Uploaded asset {} ({} bytes)", name, size);
                        details.images_uploaded += 1;
                        let entry = AssetEntry {
                            hash: asset_hash,
                            size,
                            uploaded_at: timestamp::now(),
                        };
                        images.insert(name, entry);
                    }
                    Err(e) => {
                        failed += 1;
                        warn!("{}", partial(&name, e));
                        if let Some(entry) = prior {
                            images.insert(name, entry);
                        }
                    }
                }
            }
        }
        run.advance(Phase::AssetsDecided);

        let manifest = BackupManifest::next(previous.as_ref(), data_hash, images, options.password().is_some());
        manifests.save(config, &manifest).await?;
        run.advance(Phase::ManifestCommitted);

        let mut message = format!(
            "Incremental upload complete ({} records, data {}, {} images uploaded, {} skipped",
            core.records.len(),
            if details.uploaded > 0 { "uploaded" } else { "unchanged" },
            details.images_uploaded,
            details.skipped,
        );
        if failed > 0 {
            message.push_str(&format!(", {failed} images failed"));
        }
        message.push(')');

        Ok(SyncResult::ok(message)
            .with_timestamp(rfc3339(manifest.updated_at))
            .with_details(details))
    }

    async fn try_incremental_download(
        &self,
        run: &mut Run,
        config: &WebDavConfig,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let layout = self.layout(config)?;
        let manifest = ManifestStore::new(&self.client, layout.manifest_url()).load(config).await?;
        run.advance(Phase::ManifestFetched);

        let Some(manifest) = manifest else {
            info!("No manifest on remote, falling back to the legacy backup");
            return self.try_legacy_download(config, options).await;
        };

        let raw = match self.client.get(&layout.data_url(), config).await? {
            Fetched::Found(raw) => raw,
            Fetched::NotFound => return Err(SyncError::NotFound(layout.data_url())),
        };
        let core = decode_core(&raw, manifest.encrypted, options.password())?;
        self.store.restore_snapshot(core.to_snapshot()).await?;
        info!("Restored {} records from {}", core.records.len(), layout.data_url());
        run.advance(Phase::DataDecided);

        let mut images_downloaded = 0usize;
        for name in manifest.images.keys() {
            let fetched = self.client.get(&layout.asset_url(name), config).await;
            let saved = match fetched {
                Ok(Fetched::Found(content)) => self.save_asset(name, &content).await?,
                Ok(Fetched::NotFound) => {
                    warn!("{}", partial(name, "missing on remote"));
                    false
                }
                Err(e) => {
                    warn!("{}", partial(name, e));
                    false
                }
            };
            if saved {
                images_downloaded += 1;
            }
        }
        run.advance(Phase::AssetsDecided);

        self.restore_aux(&core).await;

        let details = SyncDetails {
            downloaded: core.records.len(),
            images_downloaded,
            ..Default::default()
        };
        Ok(SyncResult::ok(format!(
            "Incremental download complete ({} records, {} images)",
            core.records.len(),
            images_downloaded
        ))
        .with_timestamp(rfc3339(core.exported_at))
        .with_details(details))
    }

    async fn try_legacy_upload(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let layout = self.layout(config)?;
        self.client.ensure_directory(layout.base_url(), config).await?;

        let core = self.build_core_data().await?;
        let images = if options.include_images {
            Some(self.collect_assets(&core).await?)
        } else {
            None
        };
        let image_count = images.as_ref().map_or(0, IndexMap::len);

        let body = legacy::encode(&core, images, options.password())?;
        self.client.put(&layout.legacy_url(), config, body).await?;
        info!("Uploaded {} ({} images inline)", layout.legacy_url(), image_count);

        let details = SyncDetails {
            uploaded: 1,
            images_uploaded: image_count,
            ..Default::default()
        };
        Ok(SyncResult::ok(format!(
            "Upload complete ({} records, {} images)",
            core.records.len(),
            image_count
        ))
        .with_timestamp(rfc3339(core.exported_at))
        .with_details(details))
    }

    async fn try_legacy_download(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let layout = self.layout(config)?;
        let raw = match self.client.get(&layout.legacy_url(), config).await? {
            Fetched::Found(raw) => raw,
            Fetched::NotFound => {
                info!("No backup at {}", layout.legacy_url());
                return Ok(SyncResult::failure("No backup found on remote"));
            }
        };

        let (core, images) = legacy::decode(&raw, options.password())?;
        self.store.restore_snapshot(core.to_snapshot()).await?;

        let mut images_downloaded = 0usize;
        for (name, content) in &images {
            if self.save_asset(name, content).await? {
                images_downloaded += 1;
            }
        }
        let (ai_restored, settings_restored) = self.restore_aux(&core).await;

        let mut message = format!(
            "Download complete ({} records, {} images",
            core.records.len(),
            images_downloaded
        );
        if ai_restored {
            message.push_str(", AI config synced");
        }
        if settings_restored {
            message.push_str(", settings synced");
        }
        message.push(')');

        let details = SyncDetails {
            downloaded: core.records.len(),
            images_downloaded,
            ..Default::default()
        };
        Ok(SyncResult::ok(message)
            .with_timestamp(rfc3339(core.exported_at))
            .with_details(details))
    }

    async fn try_bidirectional_sync(&self, config: &WebDavConfig, options: &SyncOptions) -> Result<SyncResult> {
        let layout = self.layout(config)?;
        let records = self.store.all_records().await?;
        let containers = self.store.all_containers().await?;
        let settings_at = tolerate("settings timestamp", self.settings.settings_updated_at().await);
        let local = direction::local_latest(&records, &containers, settings_at);

        let remote = legacy::probe(&self.client, &layout, config).await?;
        let decision = direction::decide(local, remote);
        info!("Sync direction: {:?} (local {:?}, remote {:?})", decision, local, remote);

        match decision {
            Direction::Upload => self.upload(config, options).await,
            Direction::Download => self.download(config, options).await,
            Direction::InSync => Ok(SyncResult::ok("Already in sync")),
        }
    }

    /// Core document for upload. `exportedAt` is the newest local change,
    /// so unchanged data always serializes to the same bytes.
    async fn build_core_data(&self) -> Result<CoreData> {
        let mut snapshot = self.store.export_snapshot().await?;
        let ai_config = tolerate("AI config", self.settings.ai_config().await);
        let settings = tolerate("settings", self.settings.settings_snapshot().await);
        let settings_at = tolerate("settings timestamp", self.settings.settings_updated_at().await);

        snapshot.exported_at = direction::local_latest(&snapshot.records, &snapshot.containers, settings_at)
            .unwrap_or_default();
        Ok(CoreData::from_snapshot(
            snapshot,
            ai_config.filter(|c| *c != AiConfig::default()),
            settings,
            settings_at.map(rfc3339),
        ))
    }

    /// Every readable referenced asset, in first-seen order.
    async fn collect_assets(&self, core: &CoreData) -> Result<IndexMap<String, String>> {
        let mut assets = IndexMap::new();
        for name in core.asset_names() {
            if let LocalAsset::Readable(content) = self.read_local_asset(&name).await? {
                assets.insert(name, content);
            }
        }
        Ok(assets)
    }

    /// Only an unrecoverable store error escapes; anything else is logged and
    /// the caller moves on to the next asset.
    async fn read_local_asset(&self, name: &str) -> Result<LocalAsset> {
        match self.store.read_asset(name).await {
            Ok(Some(content)) => Ok(LocalAsset::Readable(content)),
            Ok(None) => {
                warn!("Asset {} is referenced but not readable locally, skipping", name);
                Ok(LocalAsset::Missing)
            }
            Err(e) if e.is_unrecoverable() => Err(e),
            Err(e @ SyncError::PartialAssetFailure { .. }) => {
                warn!("{}", e);
                Ok(LocalAsset::Rejected)
            }
            Err(e) => {
                warn!("{}", partial(name, e));
                Ok(LocalAsset::Rejected)
            }
        }
    }

    /// `Ok(false)` when the asset was rejected; the batch carries on.
    async fn save_asset(&self, name: &str, content: &str) -> Result<bool> {
        match self.store.save_asset(name, content).await {
            Ok(()) => {
                debug!("Saved asset {}", name);
                Ok(true)
            }
            Err(e) if e.is_unrecoverable() => Err(e),
            Err(e) => {
                warn!("{}", partial(name, e));
                Ok(false)
            }
        }
    }

    /// Merge AI config and replace settings, each best effort. Returns which
    /// of the two were restored.
    async fn restore_aux(&self, core: &CoreData) -> (bool, bool) {
        let mut ai_restored = false;
        if let Some(ai) = &core.ai_config {
            match self.settings.merge_ai_config(ai).await {
                Ok(()) => ai_restored = true,
                Err(e) => warn!("Failed to restore AI config: {}", e),
            }
        }

        let mut settings_restored = false;
        if let Some(settings) = &core.settings {
            match self.settings.restore_settings(settings).await {
                Ok(()) => settings_restored = true,
                Err(e) => warn!("Failed to restore settings: {}", e),
            }
        }
        (ai_restored, settings_restored)
    }
}

/// A referenced asset as read from the local store.
enum LocalAsset {
    Readable(String),
    Missing,
    /// The store refused the name or failed to read it.
    Rejected,
}

fn partial(name: &str, reason: impl ToString) -> SyncError {
    SyncError::PartialAssetFailure {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Serialize the core document, wrapped in an encryption envelope when a
/// password is given.
fn encode_core(core: &CoreData, password: Option<&str>) -> Result<String> {
    let json = serde_json::to_string(core)?;
    match password {
        Some(password) => {
            let blob = crypto::encrypt(&json, password)?;
            Ok(serde_json::to_string(&EncryptedEnvelope::new(blob))?)
        }
        None => Ok(json),
    }
}

/// Parse a downloaded core document. Nothing local is touched here, so a
/// missing or wrong password leaves the local state as it was.
fn decode_core(raw: &str, flagged_encrypted: bool, password: Option<&str>) -> Result<CoreData> {
    let value: Value = serde_json::from_str(raw)?;
    let envelope = EncryptedEnvelope::detect(&value);

    let core: CoreData = match (envelope, flagged_encrypted) {
        (Some(envelope), _) => {
            let password = password.ok_or(SyncError::PasswordRequired)?;
            serde_json::from_str(&crypto::decrypt(&envelope.data, password)?)?
        }
        (None, true) => {
            password.ok_or(SyncError::PasswordRequired)?;
            return Err(SyncError::DecryptionFailed);
        }
        (None, false) => serde_json::from_value(value)?,
    };
    Ok(core.migrate())
}
