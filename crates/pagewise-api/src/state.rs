use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use pagewise_db::Database;
use pagewise_services::billing::Billing;
use pagewise_services::llm::{ChatModel, Embedder};
use pagewise_services::storage::FileFetcher;
use pagewise_services::vector::VectorStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Secret the identity provider signs session tokens with.
    pub jwt_secret: String,
    /// Secret the upload service signs its completion callbacks with.
    pub upload_secret: String,
    pub stripe_webhook_secret: String,
    /// Absolute base URL of the web app, used for billing redirects.
    pub public_url: String,
    pub pro_price_id: String,
    pub embedder: Arc<dyn Embedder>,
    pub chat_model: Arc<dyn ChatModel>,
    pub vectors: Arc<dyn VectorStore>,
    pub billing: Arc<dyn Billing>,
    pub fetcher: Arc<dyn FileFetcher>,
}

/// Run a blocking DB call off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
