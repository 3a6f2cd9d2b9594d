pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AppResult;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// Media uploads happen before the owning message row is written; an upload
/// failure aborts the send so no message ever points at a missing blob.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> AppResult<String>;
}
