use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::error::CacheError;
use crate::offline_cache::{AssetRequest, AssetResponse};

/// Network side of the offline cache.
///
/// `Err` means the request could not complete at all; HTTP error statuses
/// are returned as responses.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, CacheError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, CacheError> {
        let mut builder = self.client.get(&request.url);
        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| CacheError::network(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::network(e.to_string()))?;
        Ok(AssetResponse::new(status, content_type.as_deref(), body.to_vec()))
    }
}
