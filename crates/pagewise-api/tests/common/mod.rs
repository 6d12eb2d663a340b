//! Shared harness: an in-memory database plus scripted stand-ins for the
//! external services, wired into the real router.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, Response, header},
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use tower::ServiceExt;

use pagewise_api::{AppState, AppStateInner, router};
use pagewise_db::Database;
use pagewise_services::billing::{Billing, CheckoutParams, Subscription};
use pagewise_services::llm::{ChatMessage, ChatModel, CompletionStream, Embedder};
use pagewise_services::storage::FileFetcher;
use pagewise_services::vector::{PageVector, ScoredPage, VectorStore};
use pagewise_services::{Result, ServiceError};
use pagewise_types::api::Claims;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const UPLOAD_SECRET: &str = "test-upload-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const PRO_PRICE: &str = "price_pro";

// -- Fakes --

#[derive(Default)]
pub struct FakeEmbedder {
    pub fail: bool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(ServiceError::Upstream { service: "embeddings", status: 500, body: "down".into() });
        }
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.0]).collect())
    }
}

/// Streams the scripted fragments, optionally failing after them.
#[derive(Default)]
pub struct FakeChat {
    pub fragments: Vec<&'static str>,
    pub fail_midway: bool,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<CompletionStream> {
        self.prompts.lock().unwrap().push(messages);
        let mut items: Vec<Result<String>> =
            self.fragments.iter().map(|f| Ok(f.to_string())).collect();
        if self.fail_midway {
            items.push(Err(ServiceError::InvalidResponse("chat", "connection reset".into())));
        }
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

#[derive(Default)]
pub struct FakeVectors {
    pub namespaces: Mutex<HashMap<String, Vec<PageVector>>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_delete: bool,
}

#[async_trait]
impl VectorStore for FakeVectors {
    async fn upsert(&self, namespace: &str, vectors: Vec<PageVector>) -> Result<()> {
        self.namespaces
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .extend(vectors);
        Ok(())
    }

    async fn query(&self, namespace: &str, _vector: Vec<f32>, top_k: usize) -> Result<Vec<ScoredPage>> {
        let namespaces = self.namespaces.lock().unwrap();
        Ok(namespaces
            .get(namespace)
            .map(|vectors| {
                vectors
                    .iter()
                    .take(top_k)
                    .map(|v| ScoredPage {
                        id: v.id.clone(),
                        score: 0.9,
                        metadata: Some(v.metadata.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        if self.fail_delete {
            return Err(ServiceError::Upstream { service: "vector index", status: 503, body: String::new() });
        }
        self.namespaces.lock().unwrap().remove(namespace);
        self.deleted.lock().unwrap().push(namespace.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBilling {
    pub subscription: Mutex<Option<Subscription>>,
    pub checkouts: Mutex<Vec<(String, String)>>,
    pub portals: Mutex<Vec<String>>,
}

#[async_trait]
impl Billing for FakeBilling {
    async fn create_checkout_session(&self, params: CheckoutParams<'_>) -> Result<Option<String>> {
        self.checkouts
            .lock()
            .unwrap()
            .push((params.user_id.to_string(), params.return_url.to_string()));
        Ok(Some("https://checkout.test/session".into()))
    }

    async fn create_portal_session(&self, customer_id: &str, _return_url: &str) -> Result<Option<String>> {
        self.portals.lock().unwrap().push(customer_id.to_string());
        Ok(Some("https://portal.test/session".into()))
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        self.subscription
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.id == subscription_id)
            .ok_or(ServiceError::Upstream { service: "billing", status: 404, body: "no such subscription".into() })
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FileFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .map(Bytes::from)
            .ok_or(ServiceError::Upstream { service: "file storage", status: 404, body: String::new() })
    }
}

// -- Harness --

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub chat: Arc<FakeChat>,
    pub vectors: Arc<FakeVectors>,
    pub billing: Arc<FakeBilling>,
    pub fetcher: Arc<FakeFetcher>,
}

pub struct TestAppBuilder {
    embedder: FakeEmbedder,
    chat: FakeChat,
    vectors: FakeVectors,
}

impl TestApp {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            embedder: FakeEmbedder::default(),
            chat: FakeChat { fragments: vec!["Hello", ", ", "world."], ..Default::default() },
            vectors: FakeVectors::default(),
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn add_user(&self, id: &str) {
        self.db().upsert_user(id, &format!("{id}@example.com")).unwrap();
    }

    /// A user with a file that finished indexing.
    pub fn add_file(&self, user_id: &str, file_id: &str) {
        use pagewise_db::models::NewFile;
        use pagewise_types::models::UploadStatus;

        self.db()
            .create_file(&NewFile {
                id: file_id,
                name: "doc.pdf",
                url: &format!("https://files.test/{file_id}"),
                key: &format!("key-{file_id}"),
                user_id,
            })
            .unwrap();
        self.db().finish_processing(file_id, UploadStatus::Success).unwrap();
    }
}

impl TestAppBuilder {
    pub fn chat(mut self, chat: FakeChat) -> Self {
        self.chat = chat;
        self
    }

    pub fn failing_embedder(mut self) -> Self {
        self.embedder.fail = true;
        self
    }

    pub fn vectors(mut self, vectors: FakeVectors) -> Self {
        self.vectors = vectors;
        self
    }

    pub fn build(self) -> TestApp {
        let chat = Arc::new(self.chat);
        let vectors = Arc::new(self.vectors);
        let billing = Arc::new(FakeBilling::default());
        let fetcher = Arc::new(FakeFetcher::default());

        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: JWT_SECRET.into(),
            upload_secret: UPLOAD_SECRET.into(),
            stripe_webhook_secret: WEBHOOK_SECRET.into(),
            public_url: "http://localhost:3000".into(),
            pro_price_id: PRO_PRICE.into(),
            embedder: Arc::new(self.embedder),
            chat_model: chat.clone(),
            vectors: vectors.clone(),
            billing: billing.clone(),
            fetcher: fetcher.clone(),
        });

        TestApp {
            router: router(state.clone()),
            state,
            chat,
            vectors,
            billing,
            fetcher,
        }
    }
}

// -- Requests --

pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

pub fn get(uri: &str, user_id: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id)))
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str, user_id: &str) -> Request<Body> {
    Request::delete(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id)))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, user_id: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user_id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn subscription(id: &str, price: &str, end: DateTime<Utc>, canceled: bool) -> Subscription {
    Subscription {
        id: id.to_string(),
        customer_id: "cus_1".into(),
        price_id: Some(price.to_string()),
        current_period_end: end,
        cancel_at_period_end: canceled,
    }
}

/// Minimal PDF with one text line per page; an empty string gives a
/// page without text.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
        ];
        if !text.is_empty() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
