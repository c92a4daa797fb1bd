//! Blob store capability.

use async_trait::async_trait;
use std::path::Path;

use crate::error::StorageResult;

/// Object storage as seen by the job pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream the object at `key` into `path`, replacing its contents.
    async fn download_to_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Upload the file at `path` to `key`.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;
}
