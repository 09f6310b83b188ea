//! Uniform outcome of every public sync operation.

use crate::utils::errors::SyncError;
use super::timestamp::{self, rfc3339};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDetails {
    /// Core documents uploaded (0 or 1).
    pub uploaded: usize,
    /// Records restored from the remote.
    pub downloaded: usize,
    pub images_uploaded: usize,
    pub images_downloaded: usize,
    /// Core document and assets left untouched because their fingerprint matched.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<SyncDetails>,
}

impl SyncResult {
    /// Successful outcome stamped with the current time.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Some(rfc3339(timestamp::now())),
            details: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: None,
            details: None,
        }
    }

    /// Failed outcome whose message names the operation and the cause.
    pub fn from_error(operation: &str, err: &SyncError) -> Self {
        Self::failure(format!("{operation} failed: {err}"))
    }

    pub fn with_details(mut self, details: SyncDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}
