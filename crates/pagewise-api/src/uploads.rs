use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pagewise_db::models::{FileRow, NewFile, UserRow};
use pagewise_services::ServiceError;
use pagewise_services::pdf::{self, PageText};
use pagewise_services::signature::{UPLOAD_SIGNATURE_HEADER, verify_upload};
use pagewise_services::vector::{PageMetadata, PageVector};
use pagewise_types::api::{
    Claims, MAX_UPLOAD_SIZE, UploadAuthorizeResponse, UploadCompleteRequest,
    UploadCompleteResponse, UploadMetadata,
};
use pagewise_types::models::UploadStatus;
use pagewise_types::plans::{Plan, is_subscribed, plan_for};

use crate::state::{AppState, with_db};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("document has {pages} pages, plan allows {limit}")]
    PageLimit { pages: usize, limit: u32 },

    #[error("embedding count mismatch: {got} vectors for {expected} pages")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn user_plan(state: &AppState, user: &UserRow) -> Plan {
    let subscribed = is_subscribed(
        user.stripe_price_id.as_deref(),
        user.current_period_end(),
        Utc::now(),
    );
    plan_for(subscribed, user.stripe_price_id.as_deref(), &state.pro_price_id)
}

/// POST /api/uploads/authorize: Called before an upload starts.
///
/// Hands the upload service the metadata it must echo back in the
/// completion callback, or refuses once the plan's file quota is used.
pub async fn authorize_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub.clone();
    let (user, file_count) = with_db(&state, move |db| {
        let user = db.get_user(&user_id)?;
        let count = db.count_files(&user_id)?;
        Ok((user, count))
    })
    .await?;

    let user = user.ok_or(StatusCode::UNAUTHORIZED)?;
    let plan = user_plan(&state, &user);
    if file_count >= plan.quota {
        info!(user_id = %user.id, quota = plan.quota, "Upload refused, file quota used");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(Json(UploadAuthorizeResponse {
        metadata: UploadMetadata { user_id: user.id },
        max_file_size: MAX_UPLOAD_SIZE,
        pages_per_pdf: plan.pages_per_pdf,
    }))
}

/// POST /api/uploads/complete: Signed callback from the upload service.
///
/// Records the file, indexes it, and answers with the terminal status.
/// A repeated callback for a key the user already has returns that
/// file's current status without indexing again.
pub async fn upload_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    let signature = headers
        .get(UPLOAD_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_upload(&state.upload_secret, &body, signature).map_err(|e| {
        warn!("Rejected upload callback: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let req: UploadCompleteRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Bad upload callback body: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let file_id = Uuid::new_v4().to_string();
    let claimed_user = req.metadata.user_id.clone();
    let (user, row, created) = {
        let file_id = file_id.clone();
        with_db(&state, move |db| {
            let Some(user) = db.get_user(&req.metadata.user_id)? else {
                return Ok(None);
            };
            if let Some(existing) = db.get_file_by_key(&req.file.key, &user.id)? {
                return Ok(Some((user, existing, false)));
            }
            let row = db.create_file(&NewFile {
                id: &file_id,
                name: &req.file.name,
                url: &req.file.url,
                key: &req.file.key,
                user_id: &user.id,
            })?;
            Ok(Some((user, row, true)))
        })
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claimed_user, "Upload callback for unknown user");
            StatusCode::BAD_REQUEST
        })?
    };

    if !created {
        debug!(file_id = %row.id, "Duplicate upload callback");
        let status = row.status().map_err(|e| {
            error!("Corrupt file row {}: {}", row.id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        return Ok(Json(UploadCompleteResponse { file_id: row.id, status }));
    }

    let plan = user_plan(&state, &user);
    let status = match index_file(&state, &row, &plan).await {
        Ok(pages) => {
            info!(file_id = %row.id, pages, "File indexed");
            UploadStatus::Success
        }
        Err(e) => {
            warn!(file_id = %row.id, "Indexing failed: {}", e);
            UploadStatus::Failed
        }
    };

    let id = row.id.clone();
    let moved = with_db(&state, move |db| db.finish_processing(&id, status)).await?;
    if !moved {
        warn!(file_id = %row.id, "File left PROCESSING before indexing finished");
    }

    Ok(Json(UploadCompleteResponse { file_id: row.id, status }))
}

/// Fetch, split, embed and upsert one PDF. Returns the number of pages
/// written to the vector index.
pub async fn index_file(state: &AppState, file: &FileRow, plan: &Plan) -> Result<usize, IndexError> {
    let bytes = state.fetcher.fetch(&file.url).await?;
    let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&bytes)).await??;

    if pages.len() > plan.pages_per_pdf as usize {
        return Err(IndexError::PageLimit {
            pages: pages.len(),
            limit: plan.pages_per_pdf,
        });
    }

    let pages: Vec<PageText> = pages.into_iter().filter(|p| !p.text.is_empty()).collect();
    let texts: Vec<String> = pages.iter().map(|p| p.text.clone()).collect();
    let embeddings = state.embedder.embed_documents(&texts).await?;
    if embeddings.len() != pages.len() {
        return Err(IndexError::EmbeddingCount {
            expected: pages.len(),
            got: embeddings.len(),
        });
    }

    let vectors: Vec<PageVector> = pages
        .into_iter()
        .zip(embeddings)
        .map(|(page, values)| PageVector {
            id: format!("{}#{}", file.id, page.number),
            values,
            metadata: PageMetadata {
                text: page.text,
                page: page.number,
            },
        })
        .collect();

    let count = vectors.len();
    state.vectors.upsert(&file.id, vectors).await?;
    Ok(count)
}
