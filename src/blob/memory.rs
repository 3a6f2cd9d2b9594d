use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;

use super::BlobStore;

/// Process-local blob storage for tests and bucket-less deployments.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<(Bytes, String)> {
        self.blobs.read().await.get(url).cloned()
    }

    pub async fn stored(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> AppResult<String> {
        let url = format!("mem://blobs/{}", Uuid::new_v4());
        self.blobs
            .write()
            .await
            .insert(url.clone(), (bytes, content_type.to_string()));
        Ok(url)
    }
}
