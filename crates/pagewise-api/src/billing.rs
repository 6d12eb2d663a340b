use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use pagewise_db::models::{SubscriptionUpdate, UserRow};
use pagewise_services::billing::{CheckoutParams, WebhookEvent, parse_webhook_event};
use pagewise_services::signature::{STRIPE_SIGNATURE_HEADER, verify_webhook};
use pagewise_types::api::{BillingSessionResponse, Claims, SubscriptionPlanResponse};
use pagewise_types::plans::{is_subscribed, plan_for};

use crate::state::{AppState, with_db};

async fn load_user(state: &AppState, user_id: String) -> Result<UserRow, StatusCode> {
    with_db(state, move |db| db.get_user(&user_id))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)
}

fn subscribed(user: &UserRow) -> bool {
    is_subscribed(user.stripe_price_id.as_deref(), user.current_period_end(), Utc::now())
}

/// POST /api/billing/checkout: Where to send the user to pay.
///
/// Subscribers are sent to the billing portal, everyone else to a Pro
/// checkout. Both return to the billing page of the dashboard.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = load_user(&state, claims.sub.clone()).await?;
    let return_url = format!("{}/dashboard/billing", state.public_url.trim_end_matches('/'));

    let url = match (subscribed(&user), user.stripe_customer_id.as_deref()) {
        (true, Some(customer_id)) => state
            .billing
            .create_portal_session(customer_id, &return_url)
            .await,
        _ => {
            state
                .billing
                .create_checkout_session(CheckoutParams {
                    user_id: &user.id,
                    price_id: &state.pro_price_id,
                    return_url: &return_url,
                })
                .await
        }
    }
    .map_err(|e| {
        error!(user_id = %user.id, "Billing session failed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    Ok(Json(BillingSessionResponse { url }))
}

/// GET /api/billing/plan: The caller's current plan and billing state.
pub async fn get_subscription_plan(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = load_user(&state, claims.sub.clone()).await?;
    let is_subscribed = subscribed(&user);
    let plan = plan_for(is_subscribed, user.stripe_price_id.as_deref(), &state.pro_price_id);

    let is_canceled = match (is_subscribed, user.stripe_subscription_id.as_deref()) {
        (true, Some(subscription_id)) => state
            .billing
            .retrieve_subscription(subscription_id)
            .await
            .map_err(|e| {
                error!(user_id = %user.id, "Subscription lookup failed: {}", e);
                StatusCode::BAD_GATEWAY
            })?
            .cancel_at_period_end,
        _ => false,
    };

    let stripe_current_period_end = user.current_period_end();
    Ok(Json(SubscriptionPlanResponse {
        plan,
        is_subscribed,
        is_canceled,
        stripe_customer_id: user.stripe_customer_id,
        stripe_subscription_id: user.stripe_subscription_id,
        stripe_current_period_end,
    }))
}

/// POST /api/webhooks/stripe: Subscription lifecycle events.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_webhook(&state.stripe_webhook_secret, &body, signature, Utc::now().timestamp()).map_err(
        |e| {
            warn!("Rejected billing webhook: {}", e);
            StatusCode::BAD_REQUEST
        },
    )?;

    let event = parse_webhook_event(&body).map_err(|e| {
        warn!("Unreadable billing webhook: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    match event {
        WebhookEvent::CheckoutCompleted {
            user_id: Some(user_id),
            subscription_id: Some(subscription_id),
        } => {
            let subscription = state
                .billing
                .retrieve_subscription(&subscription_id)
                .await
                .map_err(|e| {
                    error!(subscription_id = %subscription_id, "Subscription lookup failed: {}", e);
                    StatusCode::BAD_GATEWAY
                })?;
            let Some(price_id) = subscription.price_id.clone() else {
                warn!(subscription_id = %subscription.id, "Subscription has no price; ignored");
                return Ok(StatusCode::OK);
            };

            let uid = user_id.clone();
            let updated = with_db(&state, move |db| {
                db.set_user_subscription(
                    &uid,
                    &SubscriptionUpdate {
                        customer_id: &subscription.customer_id,
                        subscription_id: &subscription.id,
                        price_id: &price_id,
                        current_period_end: subscription.current_period_end,
                    },
                )
            })
            .await?;

            if updated {
                info!(user_id = %user_id, "Subscription started");
            } else {
                warn!(user_id = %user_id, "Checkout completed for unknown user");
            }
        }
        WebhookEvent::CheckoutCompleted { .. } => {
            debug!("Checkout event without user or subscription; ignored");
        }
        WebhookEvent::InvoicePaid {
            subscription_id: Some(subscription_id),
        } => {
            let subscription = state
                .billing
                .retrieve_subscription(&subscription_id)
                .await
                .map_err(|e| {
                    error!(subscription_id = %subscription_id, "Subscription lookup failed: {}", e);
                    StatusCode::BAD_GATEWAY
                })?;
            let Some(price_id) = subscription.price_id else {
                warn!(subscription_id = %subscription_id, "Subscription has no price; ignored");
                return Ok(StatusCode::OK);
            };

            let id = subscription_id.clone();
            let end = subscription.current_period_end;
            let renewed = with_db(&state, move |db| db.renew_subscription(&id, &price_id, end)).await?;
            if renewed {
                info!(subscription_id = %subscription_id, "Subscription renewed");
            } else {
                debug!(subscription_id = %subscription_id, "Invoice for unknown subscription");
            }
        }
        WebhookEvent::InvoicePaid { subscription_id: None } => {
            debug!("Invoice without subscription; ignored");
        }
        WebhookEvent::Other(kind) => {
            debug!(kind = %kind, "Unhandled billing event");
        }
    }

    Ok(StatusCode::OK)
}
