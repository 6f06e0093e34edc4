use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cv::storage::original_key;
use crate::cv::store::{CvPatch, NewCv};
use crate::errors::AppError;
use crate::models::cv::CvRow;
use crate::state::AppState;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Deserialize)]
pub struct CvUpdateRequest {
    pub title: Option<String>,
    pub template_id: Option<String>,
    pub content: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct OriginalUploadResponse {
    pub cv_id: Uuid,
    pub key: String,
    pub size: usize,
}

fn cv_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("CV {id} not found"))
}

/// GET /api/v1/cvs
pub async fn handle_list_cvs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<CvRow>>, AppError> {
    Ok(Json(state.cvs.list(&user.uid).await?))
}

/// POST /api/v1/cvs
pub async fn handle_create_cv(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewCv>,
) -> Result<(StatusCode, Json<CvRow>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    let cv = state.cvs.create(&user.uid, req).await?;
    info!(cv_id = %cv.id, "created CV");
    Ok((StatusCode::CREATED, Json(cv)))
}

/// GET /api/v1/cvs/:id
pub async fn handle_get_cv(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CvRow>, AppError> {
    let cv = state.cvs.get(&user.uid, id).await?.ok_or_else(|| cv_not_found(id))?;
    Ok(Json(cv))
}

/// PUT /api/v1/cvs/:id
pub async fn handle_update_cv(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CvUpdateRequest>,
) -> Result<Json<CvRow>, AppError> {
    if let Some(content) = &req.content {
        if !content.is_object() {
            return Err(AppError::Validation("content must be a JSON object".into()));
        }
    }
    let patch = CvPatch {
        title: req.title,
        template_id: req.template_id,
        content: req.content,
        ats_score: None,
    };
    let cv = state
        .cvs
        .update(&user.uid, id, patch)
        .await?
        .ok_or_else(|| cv_not_found(id))?;
    Ok(Json(cv))
}

/// DELETE /api/v1/cvs/:id
pub async fn handle_delete_cv(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.cvs.delete(&user.uid, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(cv_not_found(id))
    }
}

/// POST /api/v1/cvs/:id/original
/// Multipart upload of the user's own PDF (field `file`). Later downloads
/// patch this file instead of rendering a plain one.
pub async fn handle_upload_original(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<OriginalUploadResponse>, AppError> {
    state.cvs.get(&user.uid, id).await?.ok_or_else(|| cv_not_found(id))?;

    let mut file: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
            file = Some(data.to_vec());
            break;
        }
    }

    let bytes = file.ok_or_else(|| AppError::Validation("missing `file` field".into()))?;
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AppError::Validation("uploaded file is not a PDF".into()));
    }

    let size = bytes.len();
    state.originals.store_original(&user.uid, id, bytes).await?;
    Ok(Json(OriginalUploadResponse {
        cv_id: id,
        key: original_key(&user.uid, id),
        size,
    }))
}
