use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::ats::download::{patch_or_original, pdf_attachment, render_cv, sanitize_title, select_accepted};
use crate::ats::models::{
    AtsAnalysisResult, AtsAnalyzeRequest, AtsDownloadRequest, ApplyChangesRequest, TailoredQuery,
};
use crate::ats::prompts::{analysis_prompt, analysis_system};
use crate::auth::AuthUser;
use crate::best_effort::best_effort;
use crate::cv::store::CvPatch;
use crate::errors::AppError;
use crate::models::cv::CvRow;
use crate::state::AppState;

async fn load_cv(state: &AppState, user: &AuthUser, id: Uuid) -> Result<CvRow, AppError> {
    state
        .cvs
        .get(&user.uid, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("CV {id} not found")))
}

/// POST /api/v1/ats/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AtsAnalyzeRequest>,
) -> Result<Json<AtsAnalysisResult>, AppError> {
    if req.job_description.trim().is_empty() {
        return Err(AppError::Validation("job_description must not be empty".into()));
    }
    let cv = load_cv(&state, &user, req.cv_id).await?;

    let cv_json = serde_json::to_string_pretty(&cv.content).map_err(anyhow::Error::from)?;
    let prompt = analysis_prompt(&cv_json, &req.job_description);
    let reply = state.llm.complete_json(&prompt, &analysis_system()).await?;
    let result = AtsAnalysisResult::from_model_output(reply)?;

    let patch = CvPatch {
        ats_score: Some(result.overall_score),
        ..Default::default()
    };
    best_effort("persist ats_score", state.cvs.update(&user.uid, cv.id, patch)).await;

    info!(cv_id = %cv.id, score = result.overall_score, "ATS analysis complete");
    Ok(Json(result))
}

/// POST /api/v1/ats/apply-changes
pub async fn handle_apply_changes(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ApplyChangesRequest>,
) -> Result<Json<Value>, AppError> {
    let cv = load_cv(&state, &user, req.cv_id).await?;

    let content = merge_skills(cv.content, &req.added_keywords);
    let patch = CvPatch {
        content: Some(content),
        ..Default::default()
    };
    let updated = state
        .cvs
        .update(&user.uid, cv.id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("CV {} not found", req.cv_id)))?;

    Ok(Json(json!({
        "message": "Changes applied successfully",
        "cv": updated,
    })))
}

/// POST /api/v1/ats/download-optimized
/// The user's uploaded PDF with accepted edits and keywords applied; CVs
/// without an upload get the plain rendering patched the same way.
pub async fn handle_download_optimized(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AtsDownloadRequest>,
) -> Result<Response, AppError> {
    let cv = load_cv(&state, &user, req.cv_id).await?;

    let stored = best_effort("fetch original PDF", state.originals.fetch_original(&user.uid, cv.id))
        .await
        .flatten();
    let original = match stored {
        Some(bytes) => bytes,
        None => render_cv(&cv.title, &cv.content).await?,
    };

    let edits = select_accepted(&req.diff_changes, &req.accepted_changes);
    let patched = patch_or_original(
        Bytes::from(original),
        edits,
        req.added_keywords,
        Arc::clone(&state.patch_settings),
        Duration::from_secs(state.config.patch_timeout_secs),
    )
    .await;

    let filename = format!("optimized_{}.pdf", sanitize_title(&cv.title));
    Ok(pdf_attachment(patched.to_vec(), &filename))
}

/// GET /api/v1/ats/download-tailored?cv_id=
pub async fn handle_download_tailored(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TailoredQuery>,
) -> Result<Response, AppError> {
    let cv = load_cv(&state, &user, query.cv_id).await?;
    let bytes = render_cv(&cv.title, &cv.content).await?;
    let filename = format!("tailored_{}.pdf", sanitize_title(&cv.title));
    Ok(pdf_attachment(bytes, &filename))
}

/// Appends each keyword to `content.skills` unless it is already there,
/// compared case-insensitively.
pub fn merge_skills(content: Value, keywords: &[String]) -> Value {
    let mut obj = match content {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut skills: Vec<Value> = match obj.remove("skills") {
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) if !s.trim().is_empty() => vec![Value::String(s)],
        _ => Vec::new(),
    };

    let mut seen: Vec<String> = skills
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_lowercase)
        .collect();

    for keyword in keywords {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            continue;
        }
        let lower = keyword.to_lowercase();
        if !seen.contains(&lower) {
            seen.push(lower);
            skills.push(Value::String(keyword.to_string()));
        }
    }

    obj.insert("skills".into(), Value::Array(skills));
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_skills_is_case_insensitive() {
        let content = json!({"summary": "x", "skills": ["Rust", "SQL"]});
        let merged = merge_skills(content, &kw(&["rust", "Docker", "docker", " "]));
        assert_eq!(merged["skills"], json!(["Rust", "SQL", "Docker"]));
        assert_eq!(merged["summary"], "x");
    }

    #[test]
    fn test_merge_skills_creates_missing_list() {
        let merged = merge_skills(json!({}), &kw(&["Kubernetes"]));
        assert_eq!(merged["skills"], json!(["Kubernetes"]));
    }

    #[test]
    fn test_merge_skills_on_non_object_content() {
        let merged = merge_skills(Value::Null, &kw(&["Go"]));
        assert_eq!(merged, json!({"skills": ["Go"]}));
    }
}
