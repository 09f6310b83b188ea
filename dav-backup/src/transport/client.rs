//! WebDAV operations on top of a [`Transport`].

use super::{DavMethod, DavRequest, RawResponse, Transport, WebDavConfig};
use crate::utils::errors::{Result, SyncError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::{debug, info};

/// Multi-Status, the normal answer to PROPFIND.
const MULTI_STATUS: u16 = 207;

/// Outcome of a GET: the body, or an explicit "nothing there".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Found(String),
    NotFound,
}

#[derive(Clone)]
pub struct DavClient {
    transport: Arc<dyn Transport>,
    user_agent: String,
}

impl DavClient {
    pub fn new(transport: Arc<dyn Transport>, user_agent: impl Into<String>) -> Self {
        Self {
            transport,
            user_agent: user_agent.into(),
        }
    }

    /// Build a request. The Basic auth header is derived from `config` on
    /// every call and never stored.
    fn request(
        &self,
        method: DavMethod,
        url: &str,
        config: &WebDavConfig,
        extra_headers: &[(&str, &str)],
        body: Option<String>,
    ) -> DavRequest {
        let credentials = BASE64.encode(format!("{}:{}", config.username, config.password));
        let mut headers = vec![
            ("Authorization".to_string(), format!("Basic {credentials}")),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        headers.extend(extra_headers.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        DavRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        }
    }

    /// Depth-0 PROPFIND, returned as-is.
    pub async fn probe(&self, url: &str, config: &WebDavConfig) -> Result<RawResponse> {
        let req = self.request(DavMethod::Propfind, url, config, &[("Depth", "0")], None);
        self.transport.send(req).await
    }

    /// Whether a collection or resource exists at `url`.
    pub async fn exists(&self, url: &str, config: &WebDavConfig) -> Result<bool> {
        let resp = self.probe(url, config).await?;
        if resp.is_success() || resp.status == MULTI_STATUS {
            return Ok(true);
        }
        match resp.status {
            401 | 403 => Err(SyncError::Auth { status: resp.status }),
            _ => Ok(false),
        }
    }

    /// Create the collection at `url` unless it already exists.
    pub async fn ensure_directory(&self, url: &str, config: &WebDavConfig) -> Result<()> {
        if self.exists(url, config).await? {
            debug!("Directory exists: {}", url);
            return Ok(());
        }

        let resp = self
            .transport
            .send(self.request(DavMethod::Mkcol, url, config, &[], None))
            .await?;

        // 405: the collection appeared between probe and MKCOL.
        if resp.is_success() || resp.status == 405 {
            info!("Created directory: {}", url);
            Ok(())
        } else {
            Err(classify(url, &resp))
        }
    }

    /// Create or replace the resource at `url` with `body`.
    pub async fn put(&self, url: &str, config: &WebDavConfig, body: String) -> Result<()> {
        let req = self.request(
            DavMethod::Put,
            url,
            config,
            &[("Content-Type", "application/json")],
            Some(body),
        );
        let resp = self.transport.send(req).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(classify(url, &resp))
        }
    }

    /// Fetch the resource at `url`. A 404 is `Fetched::NotFound`, not an error.
    pub async fn get(&self, url: &str, config: &WebDavConfig) -> Result<Fetched> {
        let resp = self
            .transport
            .send(self.request(DavMethod::Get, url, config, &[], None))
            .await?;

        if resp.status == 404 {
            return Ok(Fetched::NotFound);
        }
        if resp.is_success() {
            Ok(Fetched::Found(resp.body))
        } else {
            Err(classify(url, &resp))
        }
    }

    /// Remove the resource at `url`. Already gone counts as success.
    pub async fn delete(&self, url: &str, config: &WebDavConfig) -> Result<()> {
        let resp = self
            .transport
            .send(self.request(DavMethod::Delete, url, config, &[], None))
            .await?;

        if resp.is_success() || resp.status == 404 {
            Ok(())
        } else {
            Err(classify(url, &resp))
        }
    }
}

/// Map a non-success response onto the error taxonomy.
pub(crate) fn classify(url: &str, resp: &RawResponse) -> SyncError {
    match resp.status {
        401 | 403 => SyncError::Auth { status: resp.status },
        404 => SyncError::NotFound(url.to_string()),
        status => SyncError::Http {
            status,
            reason: resp.status_text.clone(),
        },
    }
}
