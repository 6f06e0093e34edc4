// In-place PDF patching: locate text in existing content streams, redact it,
// write replacements at the same position and size.
// Everything here is synchronous and CPU-bound; callers run it inside
// tokio::task::spawn_blocking.

pub mod font;
pub mod font_metrics;
pub mod geometry;
pub mod lopdf_surface;
pub mod objects;
pub mod patch;
pub mod render;
pub mod search;
pub mod surface;
pub mod text_layout;

#[cfg(test)]
pub(crate) mod fixtures;

use thiserror::Error;

// Re-export the public API consumed by the ATS handlers.
pub use patch::{apply_ats_to_pdf, PatchSettings, TextEdit};
pub use render::{render_plain_pdf, PlainDocument};

#[derive(Debug, Error)]
pub enum PatchError {
    /// Not a parseable PDF, or a PDF without pages.
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("rendering failed: {0}")]
    Rendering(String),

    #[error("page {page} out of range (document has {count})")]
    PageOutOfRange { page: usize, count: usize },
}
