use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::llm_client::LlmError;
use crate::pdf::TextEdit;

// ────────────────────────────────────────────────────────────────────────────
// Requests
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AtsAnalyzeRequest {
    pub cv_id: Uuid,
    pub job_description: String,
}

/// Clients also send `accepted_changes`; only keywords change the stored CV,
/// so serde drops it.
#[derive(Debug, Deserialize)]
pub struct ApplyChangesRequest {
    pub cv_id: Uuid,
    #[serde(default)]
    pub added_keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AtsDownloadRequest {
    pub cv_id: Uuid,
    #[serde(default)]
    pub diff_changes: Vec<DiffChange>,
    /// Indices into `diff_changes`; out-of-range entries are ignored.
    #[serde(default)]
    pub accepted_changes: Vec<i64>,
    #[serde(default)]
    pub added_keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TailoredQuery {
    pub cv_id: Uuid,
}

// ────────────────────────────────────────────────────────────────────────────
// Analysis result
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub label: String,
    pub score: i32,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_icon() -> String {
    "check".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffChange {
    #[serde(default)]
    pub section: String,
    pub before: String,
    pub after: String,
}

impl From<DiffChange> for TextEdit {
    fn from(d: DiffChange) -> Self {
        TextEdit {
            section: d.section,
            before: d.before,
            after: d.after,
        }
    }
}

/// One job requirement set against what the CV shows for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub requirement: String,
    pub cv_value: String,
    /// `match`, `missing` or `partial`.
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtsAnalysisResult {
    pub overall_score: i32,
    pub breakdown: Vec<ScoreBreakdown>,
    pub missing_keywords: Vec<String>,
    pub present_keywords: Vec<String>,
    pub suggestions: Vec<String>,
    pub diff_changes: Vec<DiffChange>,
    pub keyword_match_pct: i32,
    #[serde(default)]
    pub comparison: Vec<ComparisonRow>,
}

impl AtsAnalysisResult {
    /// Normalises a model reply into a result. Scores are clamped to 0..=100,
    /// keyword entries may be plain strings or `{"word": ...}` objects, and
    /// malformed list items are dropped rather than failing the request.
    pub fn from_model_output(value: Value) -> Result<Self, LlmError> {
        let obj = value
            .as_object()
            .ok_or_else(|| LlmError::Shape("ATS analysis is not a JSON object".into()))?;

        let breakdown = array(obj.get("breakdown"))
            .filter_map(|item| {
                let item = item.as_object()?;
                Some(ScoreBreakdown {
                    label: text(item.get("label")),
                    score: clamp_score(item.get("score")),
                    icon: item
                        .get("icon")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(default_icon),
                })
            })
            .collect();

        let diff_changes = array(obj.get("diff_changes"))
            .filter_map(|item| {
                let item = item.as_object()?;
                let before = text(item.get("before"));
                if before.trim().is_empty() {
                    return None;
                }
                Some(DiffChange {
                    section: text(item.get("section")),
                    before,
                    after: text(item.get("after")),
                })
            })
            .collect();

        let comparison = array(obj.get("comparison"))
            .filter_map(|item| {
                let item = item.as_object()?;
                Some(ComparisonRow {
                    requirement: text(item.get("requirement")),
                    cv_value: text(item.get("cv_value")),
                    status: text(item.get("status")),
                })
            })
            .collect();

        Ok(Self {
            overall_score: clamp_score(obj.get("overall_score")),
            breakdown,
            missing_keywords: keywords(obj.get("missing_keywords")),
            present_keywords: keywords(obj.get("present_keywords")),
            suggestions: array(obj.get("suggestions"))
                .map(|s| text(Some(s)))
                .filter(|s| !s.trim().is_empty())
                .collect(),
            diff_changes,
            keyword_match_pct: clamp_score(obj.get("keyword_match_pct")),
            comparison,
        })
    }
}

fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value.and_then(Value::as_array).into_iter().flatten()
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn clamp_score(value: Option<&Value>) -> i32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.map(|v| v.round().clamp(0.0, 100.0) as i32).unwrap_or(0)
}

fn keywords(value: Option<&Value>) -> Vec<String> {
    array(value)
        .filter_map(|k| match k {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(o) => o.get("word").and_then(Value::as_str).map(|w| w.trim().to_string()),
            _ => None,
        })
        .filter(|k| !k.is_empty())
        .collect()
}
