use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::pdf::{apply_ats_to_pdf, render_plain_pdf, PatchSettings, PlainDocument, TextEdit};

use super::models::DiffChange;

/// Keeps the diffs whose index is in range, in the order the indices are given.
pub fn select_accepted(diffs: &[DiffChange], indices: &[i64]) -> Vec<TextEdit> {
    indices
        .iter()
        .filter_map(|&i| usize::try_from(i).ok())
        .filter_map(|i| diffs.get(i))
        .cloned()
        .map(TextEdit::from)
        .collect()
}

/// Makes a CV title safe for a `Content-Disposition` filename: quotes removed,
/// en/em dashes turned into `-`, anything outside Latin-1 dropped.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .map(|c| if c == '\u{2014}' || c == '\u{2013}' { '-' } else { c })
        .filter(|c| (*c as u32) <= 0xFF && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "cv".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn pdf_attachment(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response()
}

/// Renders the plain fallback document for a CV off the async runtime.
pub async fn render_cv(title: &str, content: &Value) -> Result<Vec<u8>, AppError> {
    let doc = PlainDocument::from_cv_content(title, content);
    let bytes = tokio::task::spawn_blocking(move || render_plain_pdf(&doc))
        .await
        .map_err(|e| anyhow::anyhow!("render task failed: {e}"))??;
    Ok(bytes)
}

/// Applies `edits` and `keywords` to `original`. Engine errors, panics and
/// timeouts all serve `original` unchanged; the caller always gets a PDF.
pub async fn patch_or_original(
    original: Bytes,
    edits: Vec<TextEdit>,
    keywords: Vec<String>,
    settings: Arc<PatchSettings>,
    deadline: Duration,
) -> Bytes {
    if edits.is_empty() && keywords.is_empty() {
        return original;
    }

    let input = original.clone();
    let task = tokio::task::spawn_blocking(move || apply_ats_to_pdf(&input, &edits, &keywords, &settings));

    // A timed-out task keeps running on the blocking pool until it finishes.
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(result))) => {
            info!(
                applied = result.applied,
                total = result.total,
                keywords = ?result.keywords,
                "serving patched PDF"
            );
            Bytes::from(result.bytes)
        }
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "PDF patch failed, serving unmodified PDF");
            original
        }
        Ok(Err(e)) => {
            warn!(error = %e, "PDF patch task panicked, serving unmodified PDF");
            original
        }
        Err(_) => {
            warn!(timeout_ms = deadline.as_millis() as u64, "PDF patch timed out, serving unmodified PDF");
            original
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::{pdf_with_pages, text_line};

    fn diff(before: &str, after: &str) -> DiffChange {
        DiffChange {
            section: String::new(),
            before: before.into(),
            after: after.into(),
        }
    }

    #[test]
    fn test_select_accepted_ignores_out_of_range() {
        let diffs = vec![diff("a", "A"), diff("b", "B")];
        let picked = select_accepted(&diffs, &[1, -1, 5, 0]);
        let befores: Vec<_> = picked.iter().map(|e| e.before.as_str()).collect();
        assert_eq!(befores, vec!["b", "a"]);
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Senior \"Dev\" \u{2014} Résumé"), "Senior Dev - Résumé");
        assert_eq!(sanitize_title("It's mine"), "Its mine");
        assert_eq!(sanitize_title("履歴書"), "cv");
        assert_eq!(sanitize_title("   "), "cv");
    }

    #[tokio::test]
    async fn test_attachment_headers() {
        let response = pdf_attachment(b"%PDF-1.4".to_vec(), "optimized_cv.pdf");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"optimized_cv.pdf\""
        );
    }

    #[tokio::test]
    async fn test_nothing_to_apply_returns_input() {
        let original = Bytes::from_static(b"not even a pdf");
        let out = patch_or_original(
            original.clone(),
            Vec::new(),
            Vec::new(),
            Arc::new(PatchSettings::default()),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out, original);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_is_served_unchanged() {
        let original = Bytes::from_static(b"%PDF-1.4 garbage");
        let out = patch_or_original(
            original.clone(),
            vec![TextEdit::new("", "Built APIs", "Built REST APIs")],
            vec!["Rust".into()],
            Arc::new(PatchSettings::default()),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out, original);
    }

    #[tokio::test]
    async fn test_patch_changes_matching_pdf() {
        let original = Bytes::from(pdf_with_pages(&[text_line(72.0, 700.0, 11.0, "Built APIs for payments")]));
        let out = patch_or_original(
            original.clone(),
            vec![TextEdit::new("Experience", "Built APIs", "Designed REST APIs")],
            Vec::new(),
            Arc::new(PatchSettings::default()),
            Duration::from_secs(5),
        )
        .await;
        assert_ne!(out, original);
        assert!(out.starts_with(b"%PDF-"));
    }
}
