//! Payment processor (Stripe) client and webhook event decoding.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};

pub const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

pub struct CheckoutParams<'a> {
    pub user_id: &'a str,
    pub price_id: &'a str,
    pub return_url: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

#[async_trait]
pub trait Billing: Send + Sync {
    /// Hosted checkout page for a new subscription. Returns its URL.
    async fn create_checkout_session(&self, params: CheckoutParams<'_>) -> Result<Option<String>>;

    /// Hosted page where an existing customer manages their subscription.
    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<Option<String>>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription>;
}

#[derive(Clone)]
pub struct StripeClient {
    http: HttpClient,
    secret_key: String,
    base_url: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    customer: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_end: Option<i64>,
    items: RawItems,
}

#[derive(Deserialize)]
struct RawItems {
    data: Vec<RawItem>,
}

#[derive(Deserialize)]
struct RawItem {
    price: RawPrice,
    current_period_end: Option<i64>,
}

#[derive(Deserialize)]
struct RawPrice {
    id: String,
}

impl RawSubscription {
    fn into_subscription(self) -> Result<Subscription> {
        let first = self.items.data.into_iter().next();
        // Newer API versions only report the period on the subscription item.
        let period_end = self
            .current_period_end
            .or_else(|| first.as_ref().and_then(|item| item.current_period_end))
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                ServiceError::InvalidResponse("billing", "subscription has no period end".into())
            })?;

        Ok(Subscription {
            id: self.id,
            customer_id: self.customer,
            price_id: first.map(|item| item.price.id),
            current_period_end: period_end,
            cancel_at_period_end: self.cancel_at_period_end,
        })
    }
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(secret_key, STRIPE_BASE_URL)
    }

    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            secret_key: secret_key.into(),
            base_url: base_url.into(),
        })
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_response("billing", response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl Billing for StripeClient {
    async fn create_checkout_session(&self, params: CheckoutParams<'_>) -> Result<Option<String>> {
        let form = [
            ("success_url", params.return_url),
            ("cancel_url", params.return_url),
            ("payment_method_types[0]", "card"),
            ("mode", "subscription"),
            ("billing_address_collection", "auto"),
            ("line_items[0][price]", params.price_id),
            ("line_items[0][quantity]", "1"),
            ("metadata[userId]", params.user_id),
        ];
        let session: SessionResponse = self.post_form("/checkout/sessions", &form).await?.json().await?;
        info!(user_id = params.user_id, "Created checkout session");
        Ok(session.url)
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<Option<String>> {
        let form = [("customer", customer_id), ("return_url", return_url)];
        let session: SessionResponse =
            self.post_form("/billing_portal/sessions", &form).await?.json().await?;
        info!(customer_id, "Created billing portal session");
        Ok(session.url)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let response = self
            .http
            .get(format!("{}/subscriptions/{}", self.base_url, subscription_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_response("billing", response).await);
        }

        let raw: RawSubscription = response.json().await?;
        debug!(subscription_id, "Retrieved subscription");
        raw.into_subscription()
    }
}

// -- Webhooks --

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted {
        user_id: Option<String>,
        subscription_id: Option<String>,
    },
    InvoicePaid {
        subscription_id: Option<String>,
    },
    Other(String),
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Decode a (signature-verified) webhook body into the events we act on.
pub fn parse_webhook_event(body: &[u8]) -> Result<WebhookEvent> {
    let event: RawEvent = serde_json::from_slice(body)?;
    let object = &event.data.object;
    let string_at = |pointer: &str| object.pointer(pointer).and_then(|v| v.as_str()).map(str::to_string);

    Ok(match event.kind.as_str() {
        "checkout.session.completed" => WebhookEvent::CheckoutCompleted {
            user_id: string_at("/metadata/userId"),
            subscription_id: string_at("/subscription"),
        },
        "invoice.payment_succeeded" => WebhookEvent::InvoicePaid {
            subscription_id: string_at("/subscription")
                .or_else(|| string_at("/parent/subscription_details/subscription")),
        },
        _ => WebhookEvent::Other(event.kind),
    })
}
