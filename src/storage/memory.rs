// In-process object store used by tests and local runs

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::ObjectStore;
use crate::types::{AppError, AppResult};

const URL_SCHEME: &str = "memory://";

#[derive(Default)]
struct Inner {
    objects: HashMap<(String, String), (Bytes, String)>,
    /// token -> (bucket, path, expiry unix seconds)
    signed: HashMap<String, (String, String, i64)>,
    fail_uploads_matching: Option<String>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload whose path contains `pattern` fail.
    pub async fn fail_uploads_matching(&self, pattern: impl Into<String>) {
        self.inner.lock().await.fail_uploads_matching = Some(pattern.into());
    }

    pub async fn object_count(&self) -> usize {
        self.inner.lock().await.objects.len()
    }

    /// Signed-URL tokens currently held, expired ones included until the next signing.
    pub async fn signed_count(&self) -> usize {
        self.inner.lock().await.signed.len()
    }

    pub async fn contains(&self, bucket: &str, path: &str) -> bool {
        self.inner
            .lock()
            .await
            .objects
            .contains_key(&(bucket.to_string(), path.to_string()))
    }

    /// Read an object back through a URL produced by [`ObjectStore::signed_url`].
    pub async fn fetch_signed(&self, url: &str) -> AppResult<Bytes> {
        let token = url
            .strip_prefix(URL_SCHEME)
            .and_then(|rest| rest.split_once("?token="))
            .map(|(_, token)| token.to_string())
            .ok_or_else(|| AppError::Validation(format!("not a signed url: {}", url)))?;

        let inner = self.inner.lock().await;
        let (bucket, path, expires_at) = inner
            .signed
            .get(&token)
            .ok_or_else(|| AppError::Auth("unknown signature".to_string()))?;
        if Utc::now().timestamp() > *expires_at {
            return Err(AppError::Auth("signed url expired".to_string()));
        }

        inner
            .objects
            .get(&(bucket.clone(), path.clone()))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| AppError::NotFound(format!("object {}", path)))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(pattern) = &inner.fail_uploads_matching {
            if path.contains(pattern.as_str()) {
                return Err(AppError::Persistence(format!("upload of {} rejected", path)));
            }
        }
        inner.objects.insert(
            (bucket.to_string(), path.to_string()),
            (data, content_type.to_string()),
        );
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> AppResult<Bytes> {
        self.inner
            .lock()
            .await
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| AppError::NotFound(format!("object {}", path)))
    }

    async fn signed_url(&self, bucket: &str, path: &str, expires_in_secs: u32) -> AppResult<String> {
        let mut inner = self.inner.lock().await;
        if !inner.objects.contains_key(&(bucket.to_string(), path.to_string())) {
            return Err(AppError::NotFound(format!("object {}", path)));
        }

        let now = Utc::now();
        inner.signed.retain(|_, (_, _, expires_at)| *expires_at >= now.timestamp());

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = (now + Duration::seconds(i64::from(expires_in_secs))).timestamp();
        inner
            .signed
            .insert(token.clone(), (bucket.to_string(), path.to_string(), expires_at));

        Ok(format!("{}{}/{}?token={}", URL_SCHEME, bucket, path, token))
    }

    async fn delete(&self, bucket: &str, path: &str) -> AppResult<()> {
        self.inner
            .lock()
            .await
            .objects
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }
}
