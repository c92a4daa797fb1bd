//! S3-compatible client implementation.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Configuration for the S3 client.
#[derive(Clone)]
pub struct S3Config {
    /// Custom endpoint (MinIO, R2). `None` uses AWS endpoint resolution.
    pub endpoint_url: Option<String>,
    /// Static access key. `None` uses the default credential chain.
    pub access_key_id: Option<String>,
    /// Static secret key, set together with `access_key_id`
    pub secret_access_key: Option<String>,
    /// Bucket holding inputs and archives
    pub bucket_name: String,
    /// Region
    pub region: String,
}

impl Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .finish()
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bucket_name = var("S3_BUCKET_NAME")
            .ok_or_else(|| StorageError::config("S3_BUCKET_NAME not set"))?;
        let access_key_id = var("S3_ACCESS_KEY_ID");
        let secret_access_key = var("S3_SECRET_ACCESS_KEY");
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::config(
                "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
            ));
        }

        Ok(Self {
            endpoint_url: var("S3_ENDPOINT_URL"),
            access_key_id,
            secret_access_key,
            bucket_name,
            region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        })
    }
}

/// Object store backed by aws-sdk-s3.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(id, secret, None, None, "env"));
        }

        debug!("Configured S3 client for bucket {}", config.bucket_name);

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3Config::from_env()?;
        Self::new(config).await
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &self.bucket))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn download_to_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        debug!("Downloading {} to {}", key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::transport(format!("Failed reading {}: {}", key, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Downloaded {} ({} bytes) to {}", key, written, path.display());
        Ok(())
    }

    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, key))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }
}

/// Map an SDK failure onto a storage error kind.
fn map_sdk_error<E, R>(err: SdkError<E, R>, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    match &err {
        SdkError::ServiceError(context) => {
            let service_err = context.err();
            StorageError::from_service_code(service_err.code(), service_err.message(), key)
        }
        SdkError::TimeoutError(_) => {
            StorageError::timeout(format!("{}: {}", key, DisplayErrorContext(&err)))
        }
        SdkError::ConstructionFailure(_) => {
            StorageError::config(format!("{}: {}", key, DisplayErrorContext(&err)))
        }
        _ => StorageError::transport(format!("{}: {}", key, DisplayErrorContext(&err))),
    }
}
