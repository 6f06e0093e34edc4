//! In-memory collaborators for handler and router tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::{AuthError, AuthUser, TokenVerifier};
use crate::config::Config;
use crate::cv::storage::{original_key, OriginalPdfStore, StorageError};
use crate::cv::store::{CvPatch, CvStore, NewCv};
use crate::errors::AppError;
use crate::llm_client::{JsonModel, LlmError};
use crate::models::cv::CvRow;
use crate::pdf::PatchSettings;
use crate::state::AppState;

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_UID: &str = "user-1";

#[derive(Default)]
pub struct MemoryCvStore {
    rows: Mutex<HashMap<Uuid, CvRow>>,
}

impl MemoryCvStore {
    /// Inserts a row for `user_id` directly and returns its id.
    pub fn seed(&self, user_id: &str, title: &str, content: Value) -> Uuid {
        let now = Utc::now();
        let row = CvRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            template_id: "olive".to_string(),
            content,
            ats_score: None,
            status: "draft".to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        self.rows.lock().expect("lock").insert(id, row);
        id
    }

    pub fn row(&self, id: Uuid) -> Option<CvRow> {
        self.rows.lock().expect("lock").get(&id).cloned()
    }
}

#[async_trait]
impl CvStore for MemoryCvStore {
    async fn list(&self, user_id: &str) -> Result<Vec<CvRow>, AppError> {
        let rows = self.rows.lock().expect("lock");
        Ok(rows.values().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<CvRow>, AppError> {
        Ok(self.row(id).filter(|r| r.user_id == user_id))
    }

    async fn create(&self, user_id: &str, new_cv: NewCv) -> Result<CvRow, AppError> {
        let id = self.seed(user_id, &new_cv.title, new_cv.content.unwrap_or_else(|| json!({})));
        let mut rows = self.rows.lock().expect("lock");
        let row = rows.get_mut(&id).expect("just inserted");
        row.template_id = new_cv.template_id;
        Ok(row.clone())
    }

    async fn update(&self, user_id: &str, id: Uuid, patch: CvPatch) -> Result<Option<CvRow>, AppError> {
        let mut rows = self.rows.lock().expect("lock");
        let Some(row) = rows.get_mut(&id).filter(|r| r.user_id == user_id) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            row.title = title;
        }
        if let Some(template_id) = patch.template_id {
            row.template_id = template_id;
        }
        if let Some(content) = patch.content {
            row.content = content;
        }
        if patch.ats_score.is_some() {
            row.ats_score = patch.ats_score;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().expect("lock");
        if rows.get(&id).is_some_and(|r| r.user_id == user_id) {
            rows.remove(&id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Object storage keyed the same way as the S3 store.
#[derive(Default)]
pub struct MemoryPdfStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: bool,
}

impl MemoryPdfStore {
    /// A store whose every request fails.
    pub fn failing() -> Self {
        Self {
            objects: Mutex::default(),
            failing: true,
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("lock").get(key).cloned()
    }
}

#[async_trait]
impl OriginalPdfStore for MemoryPdfStore {
    async fn fetch_original(&self, user_id: &str, cv_id: Uuid) -> Result<Option<Vec<u8>>, StorageError> {
        if self.failing {
            return Err(StorageError::Request("connection refused".into()));
        }
        Ok(self.object(&original_key(user_id, cv_id)))
    }

    async fn store_original(&self, user_id: &str, cv_id: Uuid, bytes: Vec<u8>) -> Result<(), StorageError> {
        if self.failing {
            return Err(StorageError::Request("connection refused".into()));
        }
        self.objects
            .lock()
            .expect("lock")
            .insert(original_key(user_id, cv_id), bytes);
        Ok(())
    }
}

/// Answers every prompt with the same value.
pub struct StaticModel(pub Value);

#[async_trait]
impl JsonModel for StaticModel {
    async fn complete_json(&self, _prompt: &str, _system: &str) -> Result<Value, LlmError> {
        Ok(self.0.clone())
    }
}

/// Accepts only `TEST_TOKEN`, as `TEST_UID`.
pub struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        if token == TEST_TOKEN {
            Ok(AuthUser {
                uid: TEST_UID.to_string(),
            })
        } else {
            Err(AuthError::Rejected)
        }
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/cvboost_test".into(),
        s3_bucket: "cvboost-test".into(),
        s3_endpoint: "http://localhost:9000".into(),
        aws_access_key_id: "test".into(),
        aws_secret_access_key: "test".into(),
        anthropic_api_key: "test".into(),
        auth_verify_url: "http://localhost:9099/verify".into(),
        port: 0,
        rust_log: "debug".into(),
        patch_timeout_secs: 5,
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub cvs: Arc<MemoryCvStore>,
    pub originals: Arc<MemoryPdfStore>,
}

pub fn harness(model_reply: Value) -> TestHarness {
    harness_with_store(model_reply, MemoryPdfStore::default())
}

pub fn harness_with_store(model_reply: Value, originals: MemoryPdfStore) -> TestHarness {
    let cvs = Arc::new(MemoryCvStore::default());
    let originals = Arc::new(originals);
    let state = AppState {
        cvs: cvs.clone(),
        originals: originals.clone(),
        llm: Arc::new(StaticModel(model_reply)),
        verifier: Arc::new(StaticVerifier),
        patch_settings: Arc::new(PatchSettings::default()),
        config: test_config(),
    };
    TestHarness { state, cvs, originals }
}
