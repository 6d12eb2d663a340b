//! Error types for the API client

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response is not valid UTF-8")]
    Encoding,

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Status { status, body }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
