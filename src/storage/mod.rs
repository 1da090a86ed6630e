// Object storage for concept and palette images (S3-compatible)

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::types::AppResult;

pub mod memory;
pub mod s3_client;

pub use memory::MemoryObjectStore;
pub use s3_client::S3ObjectStore;

pub const PNG_CONTENT_TYPE: &str = "image/png";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes, content_type: &str)
        -> AppResult<()>;

    async fn download(&self, bucket: &str, path: &str) -> AppResult<Bytes>;

    /// Time-limited URL through which the object can be read without credentials.
    async fn signed_url(&self, bucket: &str, path: &str, expires_in_secs: u32) -> AppResult<String>;

    async fn delete(&self, bucket: &str, path: &str) -> AppResult<()>;
}

/// Bucket names and URL lifetime, shared by the read service and the worker.
#[derive(Debug, Clone)]
pub struct Buckets {
    pub concept: String,
    pub palette: String,
    pub signed_url_expiry_secs: u32,
}

impl From<&StorageConfig> for Buckets {
    fn from(config: &StorageConfig) -> Self {
        Self {
            concept: config.concept_bucket.clone(),
            palette: config.palette_bucket.clone(),
            signed_url_expiry_secs: config.signed_url_expiry_secs,
        }
    }
}

/// `{user_id}/{concept_id}/base.png` in the concept bucket.
pub fn concept_image_path(user_id: Uuid, concept_id: Uuid) -> String {
    format!("{}/{}/base.png", user_id, concept_id)
}

/// `{user_id}/{concept_id}/palette_{index}.png` in the palette bucket.
pub fn palette_image_path(user_id: Uuid, concept_id: Uuid, index: usize) -> String {
    format!("{}/{}/palette_{}.png", user_id, concept_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced_by_user_and_concept() {
        let user = Uuid::new_v4();
        let concept = Uuid::new_v4();

        let base = concept_image_path(user, concept);
        assert!(base.starts_with(&format!("{}/{}/", user, concept)));
        assert!(base.ends_with("base.png"));

        assert_eq!(
            palette_image_path(user, concept, 2),
            format!("{}/{}/palette_2.png", user, concept)
        );
    }
}
