use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use pagewise_types::api::{
    AuthCallbackResponse, BillingSessionResponse, FileMessagesResponse, GetFileRequest,
    SendMessageRequest, UploadStatusResponse,
};
use pagewise_types::models::{File, UploadStatus};

use crate::error::{ClientError, Result};

/// Streamed answer text, one fragment per item.
pub type AnswerStream = BoxStream<'static, Result<String>>;

/// Whatever can deliver a question and stream back the answer.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, file_id: &str, message: &str) -> Result<AnswerStream>;
}

/// Plan limits as reported by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    pub name: String,
    pub slug: String,
    pub quota: u32,
    pub pages_per_pdf: u32,
    pub price_amount: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub plan: PlanInfo,
    pub is_subscribed: bool,
    pub is_canceled: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_current_period_end: Option<chrono::DateTime<chrono::Utc>>,
}

/// Thin typed wrapper over the server's HTTP API for one signed-in user.
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder().connect_timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn auth_callback(&self) -> Result<bool> {
        let res: AuthCallbackResponse = self
            .send_json(self.request(Method::GET, "/api/auth/callback"))
            .await?;
        Ok(res.success)
    }

    pub async fn list_files(&self) -> Result<Vec<File>> {
        self.send_json(self.request(Method::GET, "/api/files")).await
    }

    pub async fn get_file(&self, key: &str) -> Result<File> {
        let body = GetFileRequest { key: key.to_string() };
        self.send_json(self.request(Method::POST, "/api/files/by-key").json(&body))
            .await
    }

    pub async fn upload_status(&self, file_id: &str) -> Result<UploadStatus> {
        let res: UploadStatusResponse = self
            .send_json(self.request(Method::GET, &format!("/api/files/{}/status", file_id)))
            .await?;
        Ok(res.status)
    }

    pub async fn file_messages(
        &self,
        file_id: &str,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<FileMessagesResponse> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let request = self
            .request(Method::GET, &format!("/api/files/{}/messages", file_id))
            .query(&query);
        self.send_json(request).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<File> {
        self.send_json(self.request(Method::DELETE, &format!("/api/files/{}", file_id)))
            .await
    }

    /// URL of the checkout or billing-portal page for the user.
    pub async fn billing_session(&self) -> Result<Option<String>> {
        let res: BillingSessionResponse = self
            .send_json(self.request(Method::POST, "/api/billing/checkout"))
            .await?;
        Ok(res.url)
    }

    pub async fn subscription_plan(&self) -> Result<SubscriptionPlan> {
        self.send_json(self.request(Method::GET, "/api/billing/plan")).await
    }
}

#[async_trait]
impl MessageSender for ApiClient {
    async fn send_message(&self, file_id: &str, message: &str) -> Result<AnswerStream> {
        let body = SendMessageRequest {
            file_id: file_id.to_string(),
            message: message.to_string(),
        };
        let response = self
            .request(Method::POST, "/api/message")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }
        debug!(file_id, "Answer stream opened");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = Utf8Decoder::default();
            while let Some(chunk) = bytes.next().await {
                let text = match chunk {
                    Ok(chunk) => decoder.push(&chunk),
                    Err(e) => Err(ClientError::Network(e)),
                };
                match text {
                    Ok(text) if text.is_empty() => {}
                    Ok(text) => {
                        yield Ok::<String, ClientError>(text);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            if let Err(e) = decoder.finish() {
                yield Err(e);
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Turns a byte stream into text without splitting multi-byte characters
/// that straddle chunk boundaries.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                Ok(text)
            }
            // Incomplete trailing sequence: keep it for the next chunk.
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let rest = self.pending.split_off(valid);
                let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))
                    .map_err(|_| ClientError::Encoding)?;
                Ok(text)
            }
            Err(_) => Err(ClientError::Encoding),
        }
    }

    /// Fails if the stream ended inside a character.
    pub fn finish(self) -> Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Encoding)
        }
    }
}
