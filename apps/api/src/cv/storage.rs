use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage request failed: {0}")]
    Request(String),

    #[error("object body could not be read: {0}")]
    Body(String),
}

/// Object key of the PDF a user uploaded for a CV.
pub fn original_key(user_id: &str, cv_id: Uuid) -> String {
    format!("cvs/{user_id}/{cv_id}/original.pdf")
}

/// Originals of uploaded CVs. Carried in `AppState` as `Arc<dyn OriginalPdfStore>`.
#[async_trait]
pub trait OriginalPdfStore: Send + Sync {
    /// `Ok(None)` when nothing was ever uploaded for this CV.
    async fn fetch_original(&self, user_id: &str, cv_id: Uuid) -> Result<Option<Vec<u8>>, StorageError>;

    async fn store_original(&self, user_id: &str, cv_id: Uuid, bytes: Vec<u8>) -> Result<(), StorageError>;
}

pub struct S3PdfStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3PdfStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl OriginalPdfStore for S3PdfStore {
    async fn fetch_original(&self, user_id: &str, cv_id: Uuid) -> Result<Option<Vec<u8>>, StorageError> {
        let key = original_key(user_id, cv_id);
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(StorageError::Request(DisplayErrorContext(&err).to_string()));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Body(e.to_string()))?;
        Ok(Some(data.into_bytes().to_vec()))
    }

    async fn store_original(&self, user_id: &str, cv_id: Uuid, bytes: Vec<u8>) -> Result<(), StorageError> {
        let key = original_key(user_id, cv_id);
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/pdf")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Request(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded original PDF to s3://{}/{} ({size} bytes)", self.bucket, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_key_layout() {
        let cv_id = Uuid::nil();
        assert_eq!(
            original_key("uid-42", cv_id),
            "cvs/uid-42/00000000-0000-0000-0000-000000000000/original.pdf"
        );
    }
}
