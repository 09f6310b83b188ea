//! Direct HTTP(S) transport built on reqwest.

use super::{DavRequest, RawResponse, Transport};
use crate::utils::errors::{Result, SyncError};
use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

pub struct DirectTransport {
    client: reqwest::Client,
}

impl DirectTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn send(&self, request: DavRequest) -> Result<RawResponse> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| SyncError::Network(format!("invalid method {}: {e}", request.method.as_str())))?;

        debug!("{} {}", request.method.as_str(), request.url);

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await?;

        Ok(RawResponse::new(status.as_u16(), status_text, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::spawn_dav_server;
    use crate::transport::{DavClient, Fetched, WebDavConfig};
    use std::sync::Arc;

    fn client() -> DavClient {
        DavClient::new(Arc::new(DirectTransport::new(Duration::from_secs(5)).unwrap()), "dav-backup-test")
    }

    #[tokio::test]
    async fn test_direct_round_trip_against_http_server() {
        let server = spawn_dav_server("alice", "secret").await;
        let config = WebDavConfig::new(server.base_url(), "alice", "secret");
        let client = client();

        let dir = format!("{}/backup", server.base_url());
        assert!(!client.exists(&dir, &config).await.unwrap());
        client.ensure_directory(&dir, &config).await.unwrap();
        assert!(client.exists(&dir, &config).await.unwrap());
        // idempotent
        client.ensure_directory(&dir, &config).await.unwrap();

        let file = format!("{dir}/data.json");
        client.put(&file, &config, r#"{"ok":true}"#.to_string()).await.unwrap();
        assert_eq!(
            client.get(&file, &config).await.unwrap(),
            Fetched::Found(r#"{"ok":true}"#.to_string())
        );

        client.delete(&file, &config).await.unwrap();
        assert_eq!(client.get(&file, &config).await.unwrap(), Fetched::NotFound);
        // already gone still succeeds
        client.delete(&file, &config).await.unwrap();
    }

    #[tokio::test]
    async fn test_direct_reports_auth_failure() {
        let server = spawn_dav_server("alice", "secret").await;
        let config = WebDavConfig::new(server.base_url(), "alice", "wrong");

        let err = client().get(&format!("{}/x", server.base_url()), &config).await.unwrap_err();
        assert!(matches!(err, SyncError::Auth { status: 401 }));
    }

    #[tokio::test]
    async fn test_direct_network_error() {
        // Nothing listens on port 9 of localhost in the test environment.
        let config = WebDavConfig::new("http://127.0.0.1:9", "a", "b");
        let err = client().get("http://127.0.0.1:9/data.json", &config).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
