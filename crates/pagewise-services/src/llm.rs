//! OpenAI-compatible client for embeddings and streamed chat completions.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::streaming::{LineBuffer, StreamEvent, parse_sse_line};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Inputs per embeddings request.
const EMBED_BATCH_SIZE: usize = 64;

/// Stream of completion text fragments.
pub type CompletionStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ServiceError::InvalidResponse("embeddings", "no vector returned".into()))
    }
}

/// Produces a streamed completion for a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<CompletionStream>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: HttpClient,
    config: OpenAiConfig,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.config.base_url)
            .field("chat_model", &self.config.chat_model)
            .field("embedding_model", &self.config.embedding_model)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&EmbeddingRequest { model: &self.config.embedding_model, input: batch })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_response("embeddings", response).await);
        }

        let mut body: EmbeddingResponse = response.json().await?;
        if body.data.len() != batch.len() {
            return Err(ServiceError::InvalidResponse(
                "embeddings",
                format!("expected {} vectors, got {}", batch.len(), body.data.len()),
            ));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        debug!(count = vectors.len(), model = %self.config.embedding_model, "Embedded texts");
        Ok(vectors)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<CompletionStream> {
        let url = format!("{}/chat/completions", self.config.base_url);

        debug!(
            model = %self.config.chat_model,
            messages = messages.len(),
            "Sending streaming chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.chat_model,
                messages: &messages,
                temperature: self.config.temperature,
                stream: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_response("chat completions", response).await);
        }

        let stream = async_stream::stream! {
            let mut bytes_stream = response.bytes_stream();
            let mut lines = LineBuffer::new();

            while let Some(chunk_result) = bytes_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ServiceError::Network(e));
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        Some(StreamEvent::Chunk(chunk)) => {
                            if let Some(text) = chunk.content().filter(|t| !t.is_empty()) {
                                yield Ok(text.to_string());
                            }
                        }
                        Some(StreamEvent::Done) => return,
                        Some(StreamEvent::Error(e)) => {
                            yield Err(ServiceError::InvalidResponse("chat completions", e));
                            return;
                        }
                        None => {}
                    }
                }
            }

            if let Some(line) = lines.finish()
                && let Some(StreamEvent::Chunk(chunk)) = parse_sse_line(&line)
                && let Some(text) = chunk.content()
            {
                yield Ok(text.to_string());
            }
        };

        Ok(Box::pin(stream))
    }
}
