// S3 client for the Supabase storage endpoint

use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::debug;

use crate::config::StorageConfig;
use crate::storage::ObjectStore;
use crate::types::{AppError, AppResult};

pub struct S3ObjectStore {
    region: Region,
    credentials: Credentials,
}

impl S3ObjectStore {
    pub fn new(config: &StorageConfig) -> AppResult<Self> {
        let credentials = Credentials::new(
            config.access_key_id.as_deref(),
            config.secret_access_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Invalid storage credentials: {}", e)))?;

        Ok(Self {
            region: Region::Custom {
                region: config.region.clone(),
                endpoint: config.endpoint.clone(),
            },
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> AppResult<Bucket> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| map_s3_error(e, name))?;
        Ok(bucket.with_path_style())
    }
}

fn map_s3_error(error: S3Error, target: &str) -> AppError {
    match error {
        S3Error::HttpFailWithBody(404, _) => AppError::NotFound(format!("object {}", target)),
        S3Error::HttpFailWithBody(status, body) if status >= 500 => {
            AppError::ServiceUnavailable(format!("storage returned {} for {}: {}", status, target, body))
        }
        S3Error::HttpFailWithBody(status, body) => {
            AppError::Persistence(format!("storage returned {} for {}: {}", status, target, body))
        }
        other => AppError::ServiceUnavailable(format!("storage request for {} failed: {}", target, other)),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<()> {
        debug!(bucket, path, size = data.len(), "Uploading object");
        self.bucket(bucket)?
            .put_object_with_content_type(path, &data, content_type)
            .await
            .map_err(|e| map_s3_error(e, path))?;
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> AppResult<Bytes> {
        let response = self
            .bucket(bucket)?
            .get_object(path)
            .await
            .map_err(|e| map_s3_error(e, path))?;
        Ok(Bytes::copy_from_slice(response.bytes()))
    }

    async fn signed_url(&self, bucket: &str, path: &str, expires_in_secs: u32) -> AppResult<String> {
        self.bucket(bucket)?
            .presign_get(path, expires_in_secs, None)
            .await
            .map_err(|e| map_s3_error(e, path))
    }

    async fn delete(&self, bucket: &str, path: &str) -> AppResult<()> {
        debug!(bucket, path, "Deleting object");
        self.bucket(bucket)?
            .delete_object(path)
            .await
            .map_err(|e| map_s3_error(e, path))?;
        Ok(())
    }
}
