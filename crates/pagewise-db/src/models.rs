//! Database row types. These map directly to SQLite rows.
//! Distinct from pagewise-types API models to keep the DB layer independent.

use anyhow::{Result, anyhow};

use pagewise_types::models::{File, Message, UploadStatus};

use crate::parse_timestamp;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: String,
    pub name: String,
    pub upload_status: String,
    pub url: String,
    pub key: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub text: String,
    pub is_user_message: bool,
    pub user_id: String,
    pub file_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for a freshly uploaded file.
pub struct NewFile<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub url: &'a str,
    pub key: &'a str,
    pub user_id: &'a str,
}

/// Billing references written by the payment webhook.
pub struct SubscriptionUpdate<'a> {
    pub customer_id: &'a str,
    pub subscription_id: &'a str,
    pub price_id: &'a str,
    pub current_period_end: chrono::DateTime<chrono::Utc>,
}

impl UserRow {
    pub fn current_period_end(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.stripe_current_period_end
            .as_deref()
            .and_then(|raw| parse_timestamp(raw).ok())
    }
}

impl FileRow {
    pub fn status(&self) -> Result<UploadStatus> {
        self.upload_status.parse().map_err(|e: String| anyhow!(e))
    }

    pub fn into_model(self) -> Result<File> {
        Ok(File {
            upload_status: self.status()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            name: self.name,
            url: self.url,
            key: self.key,
            user_id: self.user_id,
        })
    }
}

impl MessageRow {
    pub fn into_model(self) -> Result<Message> {
        Ok(Message {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            text: self.text,
            is_user_message: self.is_user_message,
        })
    }
}
