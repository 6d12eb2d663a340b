mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use common::{PRO_PRICE, TestApp, WEBHOOK_SECRET, body_json, get, post_json, subscription};
use pagewise_db::models::SubscriptionUpdate;
use pagewise_services::signature::{STRIPE_SIGNATURE_HEADER, sign_webhook};

fn webhook(body: &Value) -> Request<Body> {
    let raw = body.to_string();
    Request::post("/api/webhooks/stripe")
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            STRIPE_SIGNATURE_HEADER,
            sign_webhook(WEBHOOK_SECRET, Utc::now().timestamp(), raw.as_bytes()),
        )
        .body(Body::from(raw))
        .unwrap()
}

fn subscribe(app: &TestApp, user_id: &str, end: chrono::DateTime<Utc>) {
    app.db()
        .set_user_subscription(
            user_id,
            &SubscriptionUpdate {
                customer_id: "cus_1",
                subscription_id: "sub_1",
                price_id: PRO_PRICE,
                current_period_end: end,
            },
        )
        .unwrap();
}

#[tokio::test]
async fn free_user_gets_checkout() {
    let app = TestApp::new();
    app.add_user("alice");

    let response = app.send(post_json("/api/billing/checkout", "alice", json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["url"], "https://checkout.test/session");

    let checkouts = app.billing.checkouts.lock().unwrap();
    assert_eq!(
        checkouts[0],
        ("alice".to_string(), "http://localhost:3000/dashboard/billing".to_string())
    );
}

#[tokio::test]
async fn subscriber_gets_portal() {
    let app = TestApp::new();
    app.add_user("alice");
    subscribe(&app, "alice", Utc::now() + Duration::days(20));

    let body = body_json(app.send(post_json("/api/billing/checkout", "alice", json!({}))).await).await;
    assert_eq!(body["url"], "https://portal.test/session");
    assert_eq!(*app.billing.portals.lock().unwrap(), vec!["cus_1".to_string()]);
}

#[tokio::test]
async fn checkout_without_user_record_is_unauthorized() {
    let app = TestApp::new();
    let response = app.send(post_json("/api/billing/checkout", "ghost", json!({}))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn plan_reports_free_by_default() {
    let app = TestApp::new();
    app.add_user("alice");

    let plan = body_json(app.send(get("/api/billing/plan", "alice")).await).await;
    assert_eq!(plan["plan"]["slug"], "free");
    assert_eq!(plan["isSubscribed"], false);
    assert_eq!(plan["isCanceled"], false);
}

#[tokio::test]
async fn plan_reports_pro_and_cancellation() {
    let app = TestApp::new();
    app.add_user("alice");
    let end = Utc::now() + Duration::days(20);
    subscribe(&app, "alice", end);
    *app.billing.subscription.lock().unwrap() = Some(subscription("sub_1", PRO_PRICE, end, true));

    let plan = body_json(app.send(get("/api/billing/plan", "alice")).await).await;
    assert_eq!(plan["plan"]["slug"], "pro");
    assert_eq!(plan["plan"]["pagesPerPdf"], 25);
    assert_eq!(plan["isSubscribed"], true);
    assert_eq!(plan["isCanceled"], true);
    assert_eq!(plan["stripeCustomerId"], "cus_1");
}

#[tokio::test]
async fn lapsed_subscription_is_free() {
    let app = TestApp::new();
    app.add_user("alice");
    subscribe(&app, "alice", Utc::now() - Duration::days(2));

    let plan = body_json(app.send(get("/api/billing/plan", "alice")).await).await;
    assert_eq!(plan["plan"]["slug"], "free");
    assert_eq!(plan["isSubscribed"], false);
}

#[tokio::test]
async fn checkout_webhook_records_subscription() {
    let app = TestApp::new();
    app.add_user("alice");
    let end = Utc::now() + Duration::days(30);
    *app.billing.subscription.lock().unwrap() = Some(subscription("sub_1", PRO_PRICE, end, false));

    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "subscription": "sub_1", "metadata": { "userId": "alice" } } },
    });
    let response = app.send(webhook(&event)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = app.db().get_user("alice").unwrap().unwrap();
    assert_eq!(user.stripe_customer_id.as_deref(), Some("cus_1"));
    assert_eq!(user.stripe_subscription_id.as_deref(), Some("sub_1"));
    assert_eq!(user.stripe_price_id.as_deref(), Some(PRO_PRICE));
    assert_eq!(user.current_period_end().unwrap().timestamp(), end.timestamp());
}

#[tokio::test]
async fn invoice_webhook_extends_period() {
    let app = TestApp::new();
    app.add_user("alice");
    subscribe(&app, "alice", Utc::now() + Duration::days(1));
    let renewed_until = Utc::now() + Duration::days(31);
    *app.billing.subscription.lock().unwrap() =
        Some(subscription("sub_1", PRO_PRICE, renewed_until, false));

    let event = json!({
        "type": "invoice.payment_succeeded",
        "data": { "object": { "subscription": "sub_1" } },
    });
    assert_eq!(app.send(webhook(&event)).await.status(), StatusCode::OK);

    let user = app.db().get_user("alice").unwrap().unwrap();
    assert_eq!(user.current_period_end().unwrap().timestamp(), renewed_until.timestamp());
}

#[tokio::test]
async fn other_webhook_events_are_acknowledged() {
    let app = TestApp::new();
    let event = json!({ "type": "customer.created", "data": { "object": {} } });
    assert_eq!(app.send(webhook(&event)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_signature_is_checked() {
    let app = TestApp::new();
    let raw = json!({ "type": "customer.created", "data": { "object": {} } }).to_string();

    let forged = Request::post("/api/webhooks/stripe")
        .header(
            STRIPE_SIGNATURE_HEADER,
            sign_webhook("whsec_other", Utc::now().timestamp(), raw.as_bytes()),
        )
        .body(Body::from(raw.clone()))
        .unwrap();
    assert_eq!(app.send(forged).await.status(), StatusCode::BAD_REQUEST);

    let stale = Request::post("/api/webhooks/stripe")
        .header(
            STRIPE_SIGNATURE_HEADER,
            sign_webhook(WEBHOOK_SECRET, Utc::now().timestamp() - 3600, raw.as_bytes()),
        )
        .body(Body::from(raw))
        .unwrap();
    assert_eq!(app.send(stale).await.status(), StatusCode::BAD_REQUEST);
}
