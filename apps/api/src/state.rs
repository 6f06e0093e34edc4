use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::cv::storage::OriginalPdfStore;
use crate::cv::store::CvStore;
use crate::llm_client::JsonModel;
use crate::pdf::PatchSettings;

/// Shared application state injected into all route handlers via Axum extractors.
/// Collaborators are built once in `main` and swapped for in-memory ones in tests.
#[derive(Clone)]
pub struct AppState {
    pub cvs: Arc<dyn CvStore>,
    pub originals: Arc<dyn OriginalPdfStore>,
    pub llm: Arc<dyn JsonModel>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Thresholds of the PDF patch engine.
    pub patch_settings: Arc<PatchSettings>,
    pub config: Config,
}
