use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use pagewise_types::api::{
    Claims, FileMessagesQuery, FileMessagesResponse, INFINITE_QUERY_LIMIT, MAX_QUERY_LIMIT,
};

use crate::state::{AppState, with_db};

/// GET /api/files/{id}/messages?limit=&cursor=: One page of chat history,
/// newest first.
///
/// Fetches one row past the page size; if it comes back, it is dropped from
/// the page and its id becomes `nextCursor`, where the following page starts.
pub async fn get_file_messages(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(query): Query<FileMessagesQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.unwrap_or(INFINITE_QUERY_LIMIT);
    if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let cursor = query.cursor.filter(|c| !c.is_empty());
    let mut rows = with_db(&state, move |db| {
        if db.get_file(&file_id, &claims.sub)?.is_none() {
            return Ok(None);
        }
        db.page_messages(&file_id, &claims.sub, cursor.as_deref(), limit + 1)
            .map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let next_cursor = if rows.len() > limit as usize {
        rows.pop().map(|row| row.id)
    } else {
        None
    };

    let messages = rows
        .into_iter()
        .map(|row| row.into_model())
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(|e| {
            error!("Corrupt message row: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(FileMessagesResponse { messages, next_cursor }))
}
