//! Exportable state: records, containers, history and auxiliary settings.

use super::version::SchemaVersion;
use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// A user record. Only the fields the engine reasons about are typed; the
/// rest round-trips untouched through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Asset names referenced by this record.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A folder-like grouping of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// AI provider/model settings carried alongside the core data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_models: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
}

/// What the persistence layer exports and restores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Integer major schema version, as the persistence layer stores it.
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<Record>,
    pub containers: Vec<Container>,
    pub version_history: Vec<Value>,
}

/// The core document (`data.json`): everything except binary assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreData {
    #[serde(default)]
    pub version: SchemaVersion,

    #[serde(default, with = "super::timestamp")]
    pub exported_at: DateTime<Utc>,

    #[serde(default, alias = "prompts")]
    pub records: Vec<Record>,

    #[serde(default, alias = "folders")]
    pub containers: Vec<Container>,

    #[serde(default, alias = "versions")]
    pub version_history: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_config: Option<AiConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_updated_at: Option<String>,
}

impl CoreData {
    /// Build a current-version document from an exported snapshot.
    pub fn from_snapshot(
        snapshot: Snapshot,
        ai_config: Option<AiConfig>,
        settings: Option<Value>,
        settings_updated_at: Option<String>,
    ) -> Self {
        Self {
            version: SchemaVersion::CURRENT,
            exported_at: snapshot.exported_at,
            records: snapshot.records,
            containers: snapshot.containers,
            version_history: snapshot.version_history,
            ai_config,
            settings,
            settings_updated_at,
        }
    }

    /// Snapshot handed to the persistence layer's restore entry point.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version.major(),
            exported_at: self.exported_at,
            records: self.records.clone(),
            containers: self.containers.clone(),
            version_history: self.version_history.clone(),
        }
    }

    /// Asset names referenced by the records, deduplicated in first-seen order.
    pub fn asset_names(&self) -> IndexSet<String> {
        self.records
            .iter()
            .flat_map(|r| r.images.iter().cloned())
            .collect()
    }

    /// Bring a document of any supported schema version up to
    /// [`SchemaVersion::CURRENT`], one step per version transition.
    pub fn migrate(mut self) -> Self {
        while let Some(next) = self.version.next() {
            debug!("Migrating core data {} -> {}", self.version, next);
            self = match self.version {
                SchemaVersion::V1 => self.v1_to_v2(),
                SchemaVersion::V2 => self.v2_to_v3(),
                SchemaVersion::V3 => self.v3_to_v4(),
                SchemaVersion::V4 => break,
            };
            self.version = next;
        }
        self
    }

    // V1 had no containers. Records pointing at a container that does not
    // exist lose the dangling reference.
    fn v1_to_v2(mut self) -> Self {
        let known: IndexSet<&str> = self.containers.iter().map(|c| c.id.as_str()).collect();
        for record in &mut self.records {
            let dangling = matches!(
                record.extra.get("folderId"),
                Some(Value::String(id)) if !known.contains(id.as_str())
            );
            if dangling {
                record.extra.remove("folderId");
            }
        }
        self
    }

    // V2 had no version history or auxiliary settings; serde defaults
    // already give empty values, so only AI config emptiness is normalised.
    fn v2_to_v3(mut self) -> Self {
        if self.ai_config.as_ref() == Some(&AiConfig::default()) {
            self.ai_config = None;
        }
        self
    }

    // V3 kept `settingsUpdatedAt` only inside the settings state.
    fn v3_to_v4(mut self) -> Self {
        if self.settings_updated_at.is_none() {
            self.settings_updated_at = self
                .settings
                .as_ref()
                .and_then(|s| s.pointer("/state/settingsUpdatedAt"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        self
    }
}

/// Wrapper written instead of the plain document when a password is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub encrypted: bool,
    pub data: String,

    /// Legacy documents keep their inline assets outside the ciphertext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
}

impl EncryptedEnvelope {
    pub fn new(data: String) -> Self {
        Self { encrypted: true, data, images: None, exported_at: None }
    }

    /// Parse `raw` as an envelope if it is one.
    pub fn detect(raw: &Value) -> Option<Self> {
        if raw.get("encrypted").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        raw.get("data")?.as_str()?;
        serde_json::from_value(raw.clone()).ok()
    }
}

/// The pre-manifest single-document backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBackup {
    #[serde(flatten)]
    pub core: CoreData,

    /// Inline assets: name -> base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<IndexMap<String, String>>,
}

impl LegacyBackup {
    /// Split into a migrated core document and its inline assets.
    pub fn into_parts(self) -> (CoreData, IndexMap<String, String>) {
        (self.core.migrate(), self.images.unwrap_or_default())
    }
}
