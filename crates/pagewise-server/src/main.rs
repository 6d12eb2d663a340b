mod config;

use std::sync::Arc;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use pagewise_api::{AppState, AppStateInner};
use pagewise_services::billing::StripeClient;
use pagewise_services::llm::{OpenAiClient, OpenAiConfig};
use pagewise_services::storage::HttpFileFetcher;
use pagewise_services::vector::PineconeClient;
use pagewise_types::api::MAX_UPLOAD_SIZE;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagewise=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = pagewise_db::Database::open(&config.db_path)?;

    // External services
    let mut openai = OpenAiConfig::new(config.openai_api_key.clone());
    openai.base_url = config.openai_base_url.clone();
    openai.chat_model = config.chat_model.clone();
    openai.embedding_model = config.embedding_model.clone();
    let llm = Arc::new(OpenAiClient::new(openai)?);
    let vectors = Arc::new(PineconeClient::new(
        config.pinecone_api_key.clone(),
        config.pinecone_index_host.clone(),
    )?);
    let billing = Arc::new(StripeClient::new(config.stripe_secret_key.clone())?);
    let fetcher = Arc::new(HttpFileFetcher::new(MAX_UPLOAD_SIZE)?);

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        upload_secret: config.upload_secret.clone(),
        stripe_webhook_secret: config.stripe_webhook_secret.clone(),
        public_url: config.public_url.clone(),
        pro_price_id: config.stripe_pro_price_id.clone(),
        embedder: llm.clone(),
        chat_model: llm,
        vectors,
        billing,
        fetcher,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = pagewise_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Pagewise server listening on {}", addr);
    info!("Chat model: {}, embeddings: {}", config.chat_model, config.embedding_model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
