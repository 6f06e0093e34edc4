use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::cv::CvRow;

#[derive(Debug, Clone, Deserialize)]
pub struct NewCv {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_template")]
    pub template_id: String,
    #[serde(default)]
    pub content: Option<Value>,
}

fn default_title() -> String {
    "Untitled CV".to_string()
}

fn default_template() -> String {
    "olive".to_string()
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CvPatch {
    pub title: Option<String>,
    pub template_id: Option<String>,
    pub content: Option<Value>,
    #[serde(skip)]
    pub ats_score: Option<i32>,
}

/// CV persistence, scoped by owner. Carried in `AppState` as `Arc<dyn CvStore>`.
#[async_trait]
pub trait CvStore: Send + Sync {
    async fn list(&self, user_id: &str) -> Result<Vec<CvRow>, AppError>;

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<CvRow>, AppError>;

    async fn create(&self, user_id: &str, new_cv: NewCv) -> Result<CvRow, AppError>;

    /// Returns the updated row, or `None` if the user has no such CV.
    async fn update(&self, user_id: &str, id: Uuid, patch: CvPatch) -> Result<Option<CvRow>, AppError>;

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

pub struct PgCvStore {
    pool: PgPool,
}

impl PgCvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CvStore for PgCvStore {
    async fn list(&self, user_id: &str) -> Result<Vec<CvRow>, AppError> {
        let rows = sqlx::query_as::<_, CvRow>(
            "SELECT * FROM cvs WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<CvRow>, AppError> {
        let row = sqlx::query_as::<_, CvRow>("SELECT * FROM cvs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create(&self, user_id: &str, new_cv: NewCv) -> Result<CvRow, AppError> {
        let row = sqlx::query_as::<_, CvRow>(
            r#"
            INSERT INTO cvs (id, user_id, title, template_id, content, status)
            VALUES ($1, $2, $3, $4, $5, 'draft')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new_cv.title)
        .bind(&new_cv.template_id)
        .bind(new_cv.content.unwrap_or_else(|| json!({})))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update(&self, user_id: &str, id: Uuid, patch: CvPatch) -> Result<Option<CvRow>, AppError> {
        let row = sqlx::query_as::<_, CvRow>(
            r#"
            UPDATE cvs SET
                title = COALESCE($3, title),
                template_id = COALESCE($4, template_id),
                content = COALESCE($5, content),
                ats_score = COALESCE($6, ats_score),
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(patch.title)
        .bind(patch.template_id)
        .bind(patch.content)
        .bind(patch.ats_score)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM cvs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
