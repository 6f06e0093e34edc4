pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::ats::handlers as ats;
use crate::cv::handlers as cv;
use crate::state::AppState;

/// Largest accepted CV upload.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // CV records
        .route("/api/v1/cvs", get(cv::handle_list_cvs).post(cv::handle_create_cv))
        .route(
            "/api/v1/cvs/:id",
            get(cv::handle_get_cv)
                .put(cv::handle_update_cv)
                .delete(cv::handle_delete_cv),
        )
        .route(
            "/api/v1/cvs/:id/original",
            post(cv::handle_upload_original).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // ATS
        .route("/api/v1/ats/analyze", post(ats::handle_analyze))
        .route("/api/v1/ats/apply-changes", post(ats::handle_apply_changes))
        .route(
            "/api/v1/ats/download-optimized",
            post(ats::handle_download_optimized),
        )
        .route(
            "/api/v1/ats/download-tailored",
            get(ats::handle_download_tailored),
        )
        .with_state(state)
}
