use async_trait::async_trait;

use crate::error::Result;

/// The object-storage collaborator. Upload is two-step: store the bytes
/// under a caller-built path, then resolve the durable fetch locator that
/// gets denormalized into records.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Durable locator for a previously uploaded object.
    async fn download_url(&self, path: &str) -> Result<String>;
}
