//! Configuration management for the backup CLI.
//!
//! Loads configuration from a TOML file, then applies environment variable
//! overrides (a `.env` file in the working directory is read first).

use crate::executor::SyncOptions;
use crate::transport::layout::{DEFAULT_LEGACY_FILENAME, DEFAULT_ROOT_DIR};
use crate::transport::WebDavConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_URL: &str = "DAV_BACKUP_URL";
pub const ENV_USERNAME: &str = "DAV_BACKUP_USERNAME";
pub const ENV_PASSWORD: &str = "DAV_BACKUP_PASSWORD";
pub const ENV_ENCRYPTION_PASSWORD: &str = "DAV_BACKUP_ENCRYPTION_PASSWORD";
pub const ENV_DATA_DIR: &str = "DAV_BACKUP_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// WebDAV base URL
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Backup directory under the base URL
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// Single-document backup next to the backup directory
    #[serde(default = "default_legacy_filename")]
    pub legacy_filename: String,

    #[serde(default = "default_true")]
    pub include_images: bool,

    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Encrypts the core document when set
    #[serde(default, skip_serializing)]
    pub encryption_password: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Local data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_root_dir() -> String {
    DEFAULT_ROOT_DIR.to_string()
}

fn default_legacy_filename() -> String {
    DEFAULT_LEGACY_FILENAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("dav-backup/{}", env!("CARGO_PKG_VERSION"))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            legacy_filename: default_legacy_filename(),
            include_images: true,
            incremental: true,
            encryption_password: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// File (or defaults when `path` is `None`), then `.env`, then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let _ = dotenvy::dotenv();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_URL) {
            self.remote.url = url;
        }
        if let Some(username) = get(ENV_USERNAME) {
            self.remote.username = username;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.remote.password = password;
        }
        if let Some(password) = get(ENV_ENCRYPTION_PASSWORD) {
            self.sync.encryption_password = Some(password);
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.store.data_dir = PathBuf::from(dir);
        }
    }

    pub fn webdav(&self) -> anyhow::Result<WebDavConfig> {
        if self.remote.url.trim().is_empty() {
            anyhow::bail!("no WebDAV URL configured (set [remote] url or {ENV_URL})");
        }
        Ok(WebDavConfig::new(
            self.remote.url.trim(),
            self.remote.username.clone(),
            self.remote.password.clone(),
        ))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            include_images: self.sync.include_images,
            encryption_password: self.sync.encryption_password.clone(),
            incremental: self.sync.incremental,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_secs)
    }
}
