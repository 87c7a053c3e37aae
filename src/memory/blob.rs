use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::blob::BlobStore;
use crate::error::{Error, Result};

/// Object storage fake. `fail_uploads` simulates a transfer dying
/// mid-flight so tests can assert that no dangling reference survives.
pub struct MemoryBlobs {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::Relaxed);
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

impl Default for MemoryBlobs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        if self.fail_uploads.load(Ordering::Relaxed) {
            return Err(Error::Transient("object upload interrupted".to_string()));
        }

        debug!(path, size = bytes.len(), "blob stored");
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<String> {
        if !self.objects.lock().unwrap().contains_key(path) {
            return Err(Error::NotFound("object"));
        }
        Ok(format!("mem://{}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn locator_resolves_only_after_upload() {
        let blobs = MemoryBlobs::new();

        assert!(matches!(
            blobs.download_url("u1/posts/1").await,
            Err(Error::NotFound(_))
        ));

        blobs.put("u1/posts/1", vec![1, 2]).await.unwrap();
        assert_eq!(blobs.download_url("u1/posts/1").await.unwrap(), "mem://u1/posts/1");
    }

    #[tokio::test]
    async fn interrupted_uploads_store_nothing() {
        let blobs = MemoryBlobs::new();
        blobs.fail_uploads(true);

        assert!(blobs.put("u1/posts/1", vec![1]).await.is_err());
        assert_eq!(blobs.object_count(), 0);
    }
}
