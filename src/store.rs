//! Object storage for the issued certificates

use crate::{config::StorageTarget, error::BoxError};
use aws_sdk_s3::{primitives::ByteStream, Client};
use tracing::info;

/// A bucket that certificate files are written to.
///
/// Writes always overwrite whatever is stored under the key.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `body` under `key`
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BoxError>;

    /// A human-readable name for `key`, used in progress messages
    fn location(&self, key: &str) -> String {
        key.to_owned()
    }
}

/// Opens an [`ArtifactStore`] for the storage target of an invocation
#[async_trait::async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, target: &StorageTarget) -> Result<Box<dyn ArtifactStore>, BoxError>;
}

/// Connects to S3 using the ambient AWS credentials
#[derive(Clone, Copy, Debug, Default)]
pub struct S3Connector;

#[async_trait::async_trait]
impl StoreConnector for S3Connector {
    async fn connect(&self, target: &StorageTarget) -> Result<Box<dyn ArtifactStore>, BoxError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &target.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let config = loader.load().await;

        info!(bucket = %target.bucket, region = ?config.region(), "connected to s3");
        Ok(Box::new(S3Store::new(Client::new(&config), &target.bucket)))
    }
}

/// An S3 bucket
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new<S: Into<String>>(client: Client, bucket: S) -> Self {
        S3Store {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for S3Store {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BoxError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await?;

        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
