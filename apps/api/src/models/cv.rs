use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One row of `cvs`. `content` is the free-form CV document (summary,
/// experience, education, skills, ...) edited by the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CvRow {
    pub id: Uuid,
    /// Identity-provider uid of the owner.
    pub user_id: String,
    pub title: String,
    pub template_id: String,
    pub content: Value,
    pub ats_score: Option<i32>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
