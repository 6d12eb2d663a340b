use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};

use pagewise_db::models::FileRow;
use pagewise_types::api::{Claims, GetFileRequest, UploadStatusResponse};
use pagewise_types::models::{File, UploadStatus};

use crate::state::{AppState, with_db};

pub(crate) fn to_model(row: FileRow) -> Result<File, StatusCode> {
    row.into_model().map_err(|e| {
        error!("Corrupt file row: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// GET /api/files: The caller's files, newest first.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = with_db(&state, move |db| db.list_files(&claims.sub)).await?;
    let files = rows.into_iter().map(to_model).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(files))
}

/// POST /api/files/by-key: Look a file up by its storage key.
pub async fn get_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GetFileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = with_db(&state, move |db| db.get_file_by_key(&req.key, &claims.sub))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(to_model(row)?))
}

/// GET /api/files/{id}/status: Polled by the client while a file indexes.
///
/// Unknown or foreign files report `PENDING`: the upload callback may not
/// have created the record yet.
pub async fn get_file_upload_status(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = with_db(&state, move |db| db.get_file(&file_id, &claims.sub)).await?;

    let status = match row {
        Some(row) => row.status().map_err(|e| {
            error!("Corrupt file row {}: {}", row.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?,
        None => UploadStatus::Pending,
    };

    Ok(Json(UploadStatusResponse { status }))
}

/// DELETE /api/files/{id}: Returns the deleted record.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub.clone();
    let row = with_db(&state, move |db| db.delete_file(&file_id, &user_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    // The record is gone either way; stale vectors are only wasted space.
    if let Err(e) = state.vectors.delete_namespace(&row.id).await {
        warn!(file_id = %row.id, "Failed to delete vector namespace: {}", e);
    }

    info!(file_id = %row.id, user_id = %claims.sub, "File deleted");
    Ok(Json(to_model(row)?))
}
