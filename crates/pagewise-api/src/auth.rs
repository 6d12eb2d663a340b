use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use pagewise_types::api::{AuthCallbackResponse, Claims};

use crate::state::{AppState, with_db};

/// GET /api/auth/callback: First stop after the identity provider's login
/// redirect. Makes sure a local user record exists for the session.
pub async fn auth_callback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = claims
        .email
        .clone()
        .filter(|e| !e.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = claims.sub.clone();
    let created = with_db(&state, move |db| db.upsert_user(&user_id, &email)).await?;

    if created {
        info!(user_id = %claims.sub, "Created user record");
    }

    Ok(Json(AuthCallbackResponse { success: true }))
}
