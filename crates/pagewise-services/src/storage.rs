use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client as HttpClient;
use tracing::info;

use crate::error::{Result, ServiceError};

/// Reads back files the hosted upload service has stored.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Fetches stored files over HTTPS, refusing anything larger than `max_bytes`.
#[derive(Debug, Clone)]
pub struct HttpFileFetcher {
    http: HttpClient,
    max_bytes: u64,
}

impl HttpFileFetcher {
    pub fn new(max_bytes: u64) -> Result<Self> {
        let http = HttpClient::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { http, max_bytes })
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_response("file storage", response).await);
        }

        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(ServiceError::InvalidResponse(
                "file storage",
                format!("file is {} bytes, limit is {}", len, self.max_bytes),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(ServiceError::InvalidResponse(
                "file storage",
                format!("file is {} bytes, limit is {}", bytes.len(), self.max_bytes),
            ));
        }

        info!(url, size = bytes.len(), "Fetched stored file");
        Ok(bytes)
    }
}
