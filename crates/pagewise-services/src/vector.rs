//! Hosted vector index (Pinecone data-plane API).
//!
//! Every file gets its own namespace, named by the file id, so a similarity
//! query can never return pages from another document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};

/// Vectors per upsert request.
const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub text: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPage {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    pub metadata: Option<PageMetadata>,
}

impl ScoredPage {
    pub fn text(&self) -> &str {
        self.metadata.as_ref().map(|m| m.text.as_str()).unwrap_or("")
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, namespace: &str, vectors: Vec<PageVector>) -> Result<()>;

    async fn query(&self, namespace: &str, vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredPage>>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct PineconeClient {
    http: HttpClient,
    api_key: String,
    index_host: String,
}

impl std::fmt::Debug for PineconeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeClient")
            .field("index_host", &self.index_host)
            .finish()
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredPage>,
}

impl PineconeClient {
    pub fn new(api_key: impl Into<String>, index_host: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder().timeout(Duration::from_secs(30)).build()?;
        let host: String = index_host.into();
        let index_host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        Ok(Self { http, api_key: api_key.into(), index_host })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}{}", self.index_host, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_response("vector index", response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStore for PineconeClient {
    async fn upsert(&self, namespace: &str, vectors: Vec<PageVector>) -> Result<()> {
        let total = vectors.len();
        for batch in vectors.chunks(UPSERT_BATCH_SIZE) {
            self.post("/vectors/upsert", json!({ "vectors": batch, "namespace": namespace }))
                .await?;
        }
        info!(namespace, vectors = total, "Upserted vectors");
        Ok(())
    }

    async fn query(&self, namespace: &str, vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredPage>> {
        let response = self
            .post(
                "/query",
                json!({
                    "namespace": namespace,
                    "vector": vector,
                    "topK": top_k,
                    "includeMetadata": true,
                }),
            )
            .await?;

        let body: QueryResponse = response.json().await?;
        debug!(namespace, matches = body.matches.len(), "Similarity query");
        Ok(body.matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.post("/vectors/delete", json!({ "deleteAll": true, "namespace": namespace }))
            .await?;
        info!(namespace, "Deleted vector namespace");
        Ok(())
    }
}
