//! S3 object store client (cargo feature `s3`).
//!
//! The AWS SDK is async; object bodies are bridged to blocking [`Read`] with
//! [`SyncIoBridge`] so readers stay synchronous and keep streaming.

use std::io::Read;

use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tokio::runtime::{Builder, Runtime};
use tokio_util::io::SyncIoBridge;
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};

use super::transport::ObjectStore;

/// [`ObjectStore`] backed by Amazon S3, using the default AWS credential chain.
#[derive(Debug)]
pub struct S3ObjectStore {
    runtime: Runtime,
    client: Client,
}

impl S3ObjectStore {
    /// Load region and credentials from the environment.
    pub fn from_env() -> IngestionResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let sdk_config = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
        let client = Client::new(&sdk_config);
        Ok(Self { runtime, client })
    }
}

impl ObjectStore for S3ObjectStore {
    fn get_object(&self, bucket: &str, key: &str) -> IngestionResult<Box<dyn Read + Send>> {
        let url = format!("s3://{bucket}/{key}");
        let output = self
            .runtime
            .block_on(self.client.get_object().bucket(bucket).key(key).send())
            .map_err(|e| IngestionError::transport(&url, DisplayErrorContext(e)))?;
        debug!(%url, content_length = ?output.content_length(), "object opened");

        let reader = output.body.into_async_read();
        Ok(Box::new(SyncIoBridge::new_with_handle(
            Box::pin(reader),
            self.runtime.handle().clone(),
        )))
    }
}
