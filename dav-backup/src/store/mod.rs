//! Contracts of the local collaborators the engine syncs against.
//!
//! [`LocalStore`] is the persistence layer (records, containers, history and
//! binary assets). [`SettingsStore`] holds the auxiliary configuration that is
//! restored by a direct merge rather than through the persistence layer.

pub mod json;

pub use json::{JsonFileStore, JsonSettingsStore};

use crate::models::{AiConfig, Container, Record, Snapshot};
use crate::utils::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn all_records(&self) -> Result<Vec<Record>>;

    async fn all_containers(&self) -> Result<Vec<Container>>;

    async fn export_snapshot(&self) -> Result<Snapshot>;

    /// Replace the local state with `snapshot`.
    async fn restore_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Asset content as base64, `None` if the asset is not present locally.
    async fn read_asset(&self, name: &str) -> Result<Option<String>>;

    async fn save_asset(&self, name: &str, base64: &str) -> Result<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn ai_config(&self) -> Result<Option<AiConfig>>;

    /// The settings document, `{"state": {...}}`.
    async fn settings_snapshot(&self) -> Result<Option<Value>>;

    async fn settings_updated_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Merge the non-empty AI fields into the stored settings state.
    async fn merge_ai_config(&self, config: &AiConfig) -> Result<()>;

    /// Replace the stored settings state with the one in `settings`.
    async fn restore_settings(&self, settings: &Value) -> Result<()>;
}

/// Extract the AI fields from a settings state object.
pub fn ai_config_from_state(state: &Map<String, Value>) -> AiConfig {
    let text = |key: &str| state.get(key).and_then(Value::as_str).map(str::to_string);
    AiConfig {
        ai_models: state.get("aiModels").and_then(Value::as_array).cloned(),
        ai_provider: text("aiProvider"),
        ai_api_key: text("aiApiKey"),
        ai_api_url: text("aiApiUrl"),
        ai_model: text("aiModel"),
    }
}

/// Write the non-empty fields of `config` into a settings state object.
pub fn merge_ai_config_into(state: &mut Map<String, Value>, config: &AiConfig) {
    if let Some(models) = &config.ai_models {
        state.insert("aiModels".to_string(), Value::Array(models.clone()));
    }
    let fields = [
        ("aiProvider", &config.ai_provider),
        ("aiApiKey", &config.ai_api_key),
        ("aiApiUrl", &config.ai_api_url),
        ("aiModel", &config.ai_model),
    ];
    for (key, value) in fields {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            state.insert(key.to_string(), Value::String(v.to_string()));
        }
    }
}

/// Parse the `settingsUpdatedAt` field of a settings state object.
pub fn settings_updated_at_from_state(state: &Map<String, Value>) -> Option<DateTime<Utc>> {
    state
        .get("settingsUpdatedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
