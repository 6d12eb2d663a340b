use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use pagewise_services::llm::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, OPENAI_BASE_URL};
use pagewise_types::plans::DEFAULT_PRO_PRICE_ID;

/// Values that ship in `.env.example` and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub public_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub pinecone_api_key: String,
    pub pinecone_index_host: String,
    pub upload_secret: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_pro_price_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |key: &str| -> Result<String> {
            let value = lookup(key).unwrap_or_default();
            if value.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
                bail!("{key} is unset or still a placeholder");
            }
            Ok(value)
        };

        let port = optional("PAGEWISE_PORT", "3000");
        Ok(Self {
            host: optional("PAGEWISE_HOST", "0.0.0.0"),
            port: port
                .parse()
                .with_context(|| format!("PAGEWISE_PORT is not a port number: {port}"))?,
            db_path: optional("PAGEWISE_DB_PATH", "pagewise.db").into(),
            jwt_secret: secret("PAGEWISE_JWT_SECRET")?,
            public_url: optional("PAGEWISE_PUBLIC_URL", "http://localhost:3000"),
            openai_api_key: secret("OPENAI_API_KEY")?,
            openai_base_url: optional("OPENAI_BASE_URL", OPENAI_BASE_URL),
            chat_model: optional("PAGEWISE_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            embedding_model: optional("PAGEWISE_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            pinecone_api_key: secret("PINECONE_API_KEY")?,
            pinecone_index_host: secret("PINECONE_INDEX_HOST")?,
            upload_secret: secret("UPLOAD_SECRET")?,
            stripe_secret_key: secret("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: secret("STRIPE_WEBHOOK_SECRET")?,
            stripe_pro_price_id: optional("STRIPE_PRO_PRICE_ID", DEFAULT_PRO_PRICE_ID),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
