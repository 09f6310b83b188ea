//! Transport adapter for the remote WebDAV store.
//!
//! Requests go through a [`Transport`] strategy chosen once at startup:
//!
//! - [`DirectTransport`]: plain HTTP(S) via reqwest.
//! - [`ProxiedTransport`]: hands every request to a privileged host process
//!   (e.g. the main process of a desktop shell) through [`HostProxy`], for
//!   environments where direct requests would hit cross-origin restrictions.
//!
//! Both speak the same [`DavRequest`]/[`RawResponse`] pair, so
//! [`DavClient`] behaves identically on either path.

pub mod client;
pub mod direct;
pub mod layout;
pub mod proxied;

pub use client::{DavClient, Fetched};
pub use direct::DirectTransport;
pub use layout::RemoteLayout;
pub use proxied::ProxiedTransport;

use crate::utils::errors::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Remote endpoint and Basic-auth credentials, supplied per operation.
#[derive(Clone, PartialEq, Eq)]
pub struct WebDavConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl WebDavConfig {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for WebDavConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDavConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// WebDAV verbs used against the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavMethod {
    Propfind,
    Mkcol,
    Put,
    Get,
    Delete,
}

impl DavMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DavMethod::Propfind => "PROPFIND",
            DavMethod::Mkcol => "MKCOL",
            DavMethod::Put => "PUT",
            DavMethod::Get => "GET",
            DavMethod::Delete => "DELETE",
        }
    }
}

/// A fully built request, authentication header included.
#[derive(Debug, Clone, PartialEq)]
pub struct DavRequest {
    pub method: DavMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl DavRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    /// 2xx and 3xx count as success.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Request execution strategy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Execute a request. `Err` means no response was obtained.
    async fn send(&self, request: DavRequest) -> Result<RawResponse>;
}

/// Request forwarding offered by a privileged host process.
#[async_trait]
pub trait HostProxy: Send + Sync {
    async fn forward(&self, request: DavRequest) -> Result<RawResponse>;
}

/// Pick the transport strategy once: the host proxy when one is offered,
/// otherwise direct HTTP.
pub fn select_transport(
    proxy: Option<Arc<dyn HostProxy>>,
    timeout: Duration,
) -> Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match proxy {
        Some(proxy) => Arc::new(ProxiedTransport::new(proxy)),
        None => Arc::new(DirectTransport::new(timeout)?),
    };
    info!("Using {} transport", transport.name());
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryRemote;

    #[test]
    fn test_config_debug_redacts_password() {
        let config = WebDavConfig::new("https://dav.example.com", "alice", "hunter2");
        let shown = format!("{config:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_response_success_range() {
        assert!(RawResponse::new(200, "OK", "").is_success());
        assert!(RawResponse::new(207, "Multi-Status", "").is_success());
        assert!(RawResponse::new(301, "Moved", "").is_success());
        assert!(!RawResponse::new(404, "Not Found", "").is_success());
        assert!(!RawResponse::new(100, "Continue", "").is_success());
    }

    #[test]
    fn test_select_transport_prefers_proxy() {
        let remote: Arc<dyn HostProxy> = Arc::new(MemoryRemote::new());
        let proxied = select_transport(Some(remote), Duration::from_secs(5)).unwrap();
        assert_eq!(proxied.name(), "proxied");

        let direct = select_transport(None, Duration::from_secs(5)).unwrap();
        assert_eq!(direct.name(), "direct");
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let req = DavRequest {
            method: DavMethod::Get,
            url: "http://x/".to_string(),
            headers: vec![("Depth".to_string(), "0".to_string())],
            body: None,
        };
        assert_eq!(req.header("depth"), Some("0"));
        assert_eq!(req.header("Authorization"), None);
    }
}
