use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, billing, chat, files, messages, uploads};

/// All API routes. Callers add CORS and tracing layers on top.
pub fn router(state: AppState) -> Router {
    // Signed by their senders instead of carrying a session token.
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/uploads/complete", post(uploads::upload_complete))
        .route("/api/webhooks/stripe", post(billing::stripe_webhook));

    let protected_routes = Router::new()
        .route("/api/auth/callback", get(auth::auth_callback))
        .route("/api/message", post(chat::send_message))
        .route("/api/uploads/authorize", post(uploads::authorize_upload))
        .route("/api/files", get(files::list_files))
        .route("/api/files/by-key", post(files::get_file))
        .route("/api/files/{id}", axum::routing::delete(files::delete_file))
        .route("/api/files/{id}/status", get(files::get_file_upload_status))
        .route("/api/files/{id}/messages", get(messages::get_file_messages))
        .route("/api/billing/checkout", post(billing::create_checkout_session))
        .route("/api/billing/plan", get(billing::get_subscription_plan))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
