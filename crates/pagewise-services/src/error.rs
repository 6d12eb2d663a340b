//! Error types for the external service clients

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {0}: {1}")]
    InvalidResponse(&'static str, String),

    #[error("PDF could not be read: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Document has no extractable text")]
    EmptyDocument,

    #[error("Signature verification failed: {0}")]
    InvalidSignature(&'static str),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl ServiceError {
    /// Turn a non-success HTTP response into an `Upstream` error.
    pub(crate) async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Upstream { service, status, body }
    }
}
