use std::sync::Arc;

use super::model::{BucketPolicy, UploadFile, RESOLUTION_BUCKET};
use super::store::ObjectStorage;
use crate::error::Result;
use crate::retry::RetryPolicy;

/// Owns the resolution-image bucket: creation, uploads and cleanup.
pub struct AttachmentManager<O> {
    storage: Arc<O>,
    bucket: String,
    policy: BucketPolicy,
    retry: RetryPolicy,
}

impl<O> Clone for AttachmentManager<O> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            bucket: self.bucket.clone(),
            policy: self.policy.clone(),
            retry: self.retry,
        }
    }
}

impl<O: ObjectStorage> AttachmentManager<O> {
    pub fn new(storage: Arc<O>, retry: RetryPolicy) -> Self {
        Self::with_bucket(storage, RESOLUTION_BUCKET, BucketPolicy::resolution_images(), retry)
    }

    pub fn with_bucket(
        storage: Arc<O>,
        bucket: impl Into<String>,
        policy: BucketPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
            policy,
            retry,
        }
    }

    /// Creates the bucket with its policy unless it already exists.
    pub async fn ensure_bucket(&self) -> Result<()> {
        let storage = &self.storage;
        let bucket = self.bucket.as_str();

        let exists = self.retry.run(|| storage.bucket_exists(bucket)).await?;
        if exists {
            tracing::debug!("Bucket {} already present", bucket);
            return Ok(());
        }

        let policy = &self.policy;
        self.retry
            .run(|| storage.create_bucket(bucket, policy))
            .await?;
        tracing::info!(
            bucket,
            public = policy.public,
            file_size_limit = policy.file_size_limit,
            "Created resolution image bucket"
        );
        Ok(())
    }

    /// Stores `file` under a fresh key for `complaint_id` and returns its
    /// public URL. Linking the URL to the record is the caller's next step.
    pub async fn upload(&self, complaint_id: &str, file: &UploadFile) -> Result<String> {
        let key = object_key(complaint_id, &file.extension());
        let storage = &self.storage;
        let bucket = self.bucket.as_str();

        self.retry
            .run(|| storage.put_object(bucket, &key, file))
            .await?;

        let url = storage.public_url(bucket, &key)?;
        tracing::info!(complaint_id, key = %key, bytes = file.bytes.len(), "Uploaded resolution image");
        Ok(url)
    }

    /// Best-effort delete of the object behind a previously issued URL.
    /// Failures are logged and swallowed so record deletion can proceed.
    pub async fn remove_by_url(&self, url: &str) {
        let Some(key) = object_key_from_url(url) else {
            tracing::warn!(url, "No object key in image URL, skipping cleanup");
            return;
        };

        let storage = &self.storage;
        let bucket = self.bucket.as_str();
        match self.retry.run(|| storage.delete_object(bucket, key)).await {
            Ok(()) => tracing::info!(key, "Deleted resolution image"),
            Err(e) => tracing::error!(key, error = %e, "Failed to delete image"),
        }
    }
}

/// `{complaint_id}-{random}.{ext}`. The suffix is 64 bits from the thread
/// RNG, enough to keep repeated uploads for one complaint apart.
pub fn object_key(complaint_id: &str, extension: &str) -> String {
    format!("{}-{:016x}.{}", complaint_id, rand::random::<u64>(), extension)
}

/// Final path segment of a public URL, ignoring query and fragment.
pub fn object_key_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|key| !key.is_empty())
}
