use std::future::Future;

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, PublicAccessBlockConfiguration,
};
use aws_sdk_s3::Client as S3Client;

use super::model::{BucketPolicy, UploadFile};
use crate::error::{AtomError, Result};

/// Seam between the attachment manager and object storage.
pub trait ObjectStorage: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Creating a bucket that already exists must succeed.
    fn create_bucket(
        &self,
        bucket: &str,
        policy: &BucketPolicy,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fails with [`AtomError::StoragePolicy`] when the file breaks the
    /// bucket's policy; nothing is written in that case.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: &UploadFile,
    ) -> impl Future<Output = Result<()>> + Send;

    fn public_url(&self, bucket: &str, key: &str) -> Result<String>;

    fn delete_object(&self, bucket: &str, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// S3 has no native per-bucket size/MIME limits, so the adapter holds the
/// policy and applies it before `PutObject`.
#[derive(Debug, Clone)]
pub struct S3ObjectStorage {
    client: S3Client,
    region: String,
    policy: BucketPolicy,
    public_base_url: Option<String>,
}

impl S3ObjectStorage {
    pub fn new(client: S3Client, region: impl Into<String>, policy: BucketPolicy) -> Self {
        Self {
            client,
            region: region.into(),
            policy,
            public_base_url: None,
        }
    }

    /// Serve objects from a CDN or custom domain instead of the bucket host.
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    async fn make_public(&self, bucket: &str) -> Result<()> {
        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(
                PublicAccessBlockConfiguration::builder()
                    .block_public_acls(true)
                    .ignore_public_acls(true)
                    .block_public_policy(false)
                    .restrict_public_buckets(false)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| storage_error("put_public_access_block", e))?;

        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "PublicRead",
                "Effect": "Allow",
                "Principal": "*",
                "Action": "s3:GetObject",
                "Resource": format!("arn:aws:s3:::{}/*", bucket),
            }]
        });

        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy.to_string())
            .send()
            .await
            .map_err(|e| storage_error("put_bucket_policy", e))?;

        Ok(())
    }
}

fn storage_error(operation: &str, err: impl std::error::Error) -> AtomError {
    AtomError::Storage(format!("S3 {} error: {}", operation, DisplayErrorContext(err)))
}

impl ObjectStorage for S3ObjectStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Ok(false)
                } else {
                    Err(storage_error("head_bucket", err))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str, policy: &BucketPolicy) -> Result<()> {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            builder = builder.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        if let Err(err) = builder.send().await {
            let owned = err
                .as_service_error()
                .map(|e| e.is_bucket_already_owned_by_you())
                .unwrap_or(false);
            if !owned {
                return Err(storage_error("create_bucket", err));
            }
            tracing::info!("Bucket {} already exists", bucket);
        }

        if policy.public {
            self.make_public(bucket).await?;
        }

        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, file: &UploadFile) -> Result<()> {
        self.policy.check(file)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(file.content_type.as_str())
            .body(ByteStream::from(file.bytes.clone()))
            .send()
            .await
            .map_err(|e| storage_error("put_object", e))?;

        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(AtomError::Storage("cannot build a URL for an empty key".into()));
        }
        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.region, key),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("delete_object", e))?;
        Ok(())
    }
}
