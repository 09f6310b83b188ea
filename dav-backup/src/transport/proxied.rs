//! Transport that routes requests through a privileged host process.

use super::{DavRequest, HostProxy, RawResponse, Transport};
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct ProxiedTransport {
    proxy: Arc<dyn HostProxy>,
}

impl ProxiedTransport {
    pub fn new(proxy: Arc<dyn HostProxy>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl Transport for ProxiedTransport {
    fn name(&self) -> &'static str {
        "proxied"
    }

    async fn send(&self, request: DavRequest) -> Result<RawResponse> {
        debug!("{} {} (via host proxy)", request.method.as_str(), request.url);
        self.proxy.forward(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryRemote;
    use crate::transport::DavMethod;

    #[tokio::test]
    async fn test_forwards_request_unchanged() {
        let remote = Arc::new(MemoryRemote::new());
        let transport = ProxiedTransport::new(remote.clone());

        let request = DavRequest {
            method: DavMethod::Put,
            url: "https://dav.test/file.json".to_string(),
            headers: vec![("Authorization".to_string(), "Basic dTpw".to_string())],
            body: Some("{}".to_string()),
        };
        let response = transport.send(request.clone()).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(remote.requests().last(), Some(&request));
        assert_eq!(remote.file("https://dav.test/file.json").as_deref(), Some("{}"));
    }
}
