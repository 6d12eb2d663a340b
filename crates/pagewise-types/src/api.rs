use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Message, UploadStatus};
use crate::plans::Plan;

/// Default page size of the message listing.
pub const INFINITE_QUERY_LIMIT: u32 = 10;

/// Largest page size a caller may ask for.
pub const MAX_QUERY_LIMIT: u32 = 100;

/// PDFs larger than this are refused by the upload service.
pub const MAX_UPLOAD_SIZE: u64 = 4 * 1024 * 1024;

// -- Identity --

/// Bearer-token claims issued by the hosted identity provider.
///
/// Shared between the API middleware (which verifies them) and the
/// client (which only forwards the raw token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthCallbackResponse {
    pub success: bool,
}

// -- Chat --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub file_id: String,
    pub message: String,
}

// -- Files --

#[derive(Debug, Serialize, Deserialize)]
pub struct GetFileRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub status: UploadStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FileMessagesQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMessagesResponse {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// -- Uploads --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub key: String,
    pub name: String,
    pub url: String,
}

/// Body of the upload service's completion callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCompleteRequest {
    pub metadata: UploadMetadata,
    pub file: UploadedFile,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAuthorizeResponse {
    pub metadata: UploadMetadata,
    pub max_file_size: u64,
    pub pages_per_pdf: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleteResponse {
    pub file_id: String,
    pub status: UploadStatus,
}

// -- Billing --

#[derive(Debug, Serialize, Deserialize)]
pub struct BillingSessionResponse {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlanResponse {
    pub plan: Plan,
    pub is_subscribed: bool,
    pub is_canceled: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bodies_ignore_unknown_fields() {
        let req: SendMessageRequest =
            serde_json::from_str(r#"{"fileId":"f1","message":"hello","admin":true}"#).unwrap();
        assert_eq!(req.file_id, "f1");
        assert_eq!(req.message, "hello");

        let req: GetFileRequest = serde_json::from_str(r#"{"key":"abc.pdf","extra":1}"#).unwrap();
        assert_eq!(req.key, "abc.pdf");

        assert!(serde_json::from_str::<SendMessageRequest>(r#"{"fileId":"f1"}"#).is_err());
    }

    #[test]
    fn next_cursor_is_omitted_on_last_page() {
        let page = FileMessagesResponse { messages: vec![], next_cursor: None };
        let json = serde_json::to_string(&page).unwrap();
        assert_eq!(json, r#"{"messages":[]}"#);

        let back: FileMessagesResponse = serde_json::from_str(&json).unwrap();
        assert!(back.next_cursor.is_none());
    }

    #[test]
    fn upload_callback_body_shape() {
        let body = r#"{
            "metadata": {"userId": "kp_123"},
            "file": {"key": "abc.pdf", "name": "paper.pdf", "url": "https://files.example/abc.pdf"}
        }"#;
        let req: UploadCompleteRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.metadata.user_id, "kp_123");
        assert_eq!(req.file.key, "abc.pdf");
    }
}
