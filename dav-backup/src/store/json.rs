//! File-backed stores used by the CLI.
//!
//! ```text
//! <data_dir>/
//!   records.json      [Record]
//!   containers.json   [Container]
//!   versions.json     [version history entries]
//!   settings.json     {"state": {...}}, may hold `masterPassword`
//!   images/<name>     raw asset bytes
//! ```

use super::{ai_config_from_state, merge_ai_config_into, settings_updated_at_from_state, LocalStore, SettingsStore};
use crate::models::{AiConfig, Container, Record, SchemaVersion, Snapshot};
use crate::security::{decrypt_text, encrypt_text, is_encrypted, MasterPasswordRecord, Session};
use crate::utils::errors::{Result, SyncError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORDS_FILE: &str = "records.json";
const CONTAINERS_FILE: &str = "containers.json";
const VERSIONS_FILE: &str = "versions.json";
const SETTINGS_FILE: &str = "settings.json";
const IMAGES_DIR: &str = "images";
const MASTER_PASSWORD_KEY: &str = "masterPassword";

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| SyncError::Store(format!("{} is not valid JSON: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(SyncError::Store(format!("failed to read {}: {e}", path.display()))),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| SyncError::Store(format!("failed to write {}: {e}", path.display())))
}

/// Asset names become file names; anything that could escape the images
/// directory is refused.
fn validate_asset_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(SyncError::PartialAssetFailure {
            name: name.to_string(),
            reason: "invalid asset name".to_string(),
        });
    }
    Ok(())
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn asset_path(&self, name: &str) -> Result<PathBuf> {
        validate_asset_name(name)?;
        Ok(self.dir.join(IMAGES_DIR).join(name))
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn all_records(&self) -> Result<Vec<Record>> {
        read_json(&self.dir.join(RECORDS_FILE)).await
    }

    async fn all_containers(&self) -> Result<Vec<Container>> {
        read_json(&self.dir.join(CONTAINERS_FILE)).await
    }

    async fn export_snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            version: SchemaVersion::CURRENT.major(),
            exported_at: Utc::now(),
            records: self.all_records().await?,
            containers: self.all_containers().await?,
            version_history: read_json(&self.dir.join(VERSIONS_FILE)).await?,
        })
    }

    async fn restore_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        write_json(&self.dir.join(RECORDS_FILE), &snapshot.records).await?;
        write_json(&self.dir.join(CONTAINERS_FILE), &snapshot.containers).await?;
        write_json(&self.dir.join(VERSIONS_FILE), &snapshot.version_history).await?;
        debug!(
            "Restored {} records, {} containers into {}",
            snapshot.records.len(),
            snapshot.containers.len(),
            self.dir.display()
        );
        Ok(())
    }

    async fn read_asset(&self, name: &str) -> Result<Option<String>> {
        let path = self.asset_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(BASE64.encode(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Store(format!("failed to read {}: {e}", path.display()))),
        }
    }

    async fn save_asset(&self, name: &str, base64: &str) -> Result<()> {
        let path = self.asset_path(name)?;
        let bytes = BASE64
            .decode(base64.trim())
            .map_err(|e| SyncError::PartialAssetFailure {
                name: name.to_string(),
                reason: format!("invalid base64: {e}"),
            })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| SyncError::Store(format!("failed to write {}: {e}", path.display())))
    }
}

/// Settings document store. With an unlocked [`Session`] the AI API key is
/// kept as an `ENC::` field on disk and handed out in the clear.
pub struct JsonSettingsStore {
    path: PathBuf,
    session: Option<Session>,
}

impl JsonSettingsStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SETTINGS_FILE),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// The configured master password, if any.
    pub async fn master_password_record(&self) -> Result<Option<MasterPasswordRecord>> {
        let Some(value) = self.state().await?.and_then(|mut state| state.remove(MASTER_PASSWORD_KEY)) else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring malformed master password record: {}", e);
                Ok(None)
            }
        }
    }

    /// Store a master password record, keeping the rest of the state.
    pub async fn save_master_password_record(&self, record: &MasterPasswordRecord) -> Result<()> {
        let mut state = self.state().await?.unwrap_or_default();
        state.insert(MASTER_PASSWORD_KEY.to_string(), serde_json::to_value(record)?);
        write_json(&self.path, &serde_json::json!({ "state": state })).await
    }

    /// Plain API key for an `ENC::` field. Without a usable key the stored
    /// value is passed through unchanged.
    fn reveal(&self, stored: String) -> String {
        let Some(session) = &self.session else {
            return stored;
        };
        match decrypt_text(&stored, session) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("AI API key left encrypted: {}", e);
                stored
            }
        }
    }

    fn seal(&self, plain: &str) -> Result<String> {
        match &self.session {
            Some(session) if session.active_key().is_some() && !is_encrypted(plain) => encrypt_text(plain, session),
            _ => Ok(plain.to_string()),
        }
    }

    async fn load(&self) -> Result<Option<Value>> {
        read_json::<Option<Value>>(&self.path).await
    }

    async fn state(&self) -> Result<Option<Map<String, Value>>> {
        Ok(self
            .load()
            .await?
            .and_then(|doc| doc.get("state").and_then(Value::as_object).cloned()))
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn ai_config(&self) -> Result<Option<AiConfig>> {
        let Some(state) = self.state().await? else {
            return Ok(None);
        };
        let mut config = ai_config_from_state(&state);
        config.ai_api_key = config.ai_api_key.map(|key| self.reveal(key));
        Ok(Some(config))
    }

    async fn settings_snapshot(&self) -> Result<Option<Value>> {
        Ok(self
            .state()
            .await?
            .map(|state| serde_json::json!({ "state": state })))
    }

    async fn settings_updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .state()
            .await?
            .and_then(|state| settings_updated_at_from_state(&state)))
    }

    async fn merge_ai_config(&self, config: &AiConfig) -> Result<()> {
        let mut config = config.clone();
        if let Some(key) = config.ai_api_key.as_deref().filter(|k| !k.is_empty()) {
            config.ai_api_key = Some(self.seal(key)?);
        }
        let mut state = self.state().await?.unwrap_or_default();
        merge_ai_config_into(&mut state, &config);
        write_json(&self.path, &serde_json::json!({ "state": state })).await
    }

    async fn restore_settings(&self, settings: &Value) -> Result<()> {
        let Some(state) = settings.get("state") else {
            return Ok(());
        };
        write_json(&self.path, &serde_json::json!({ "state": state })).await
    }
}
