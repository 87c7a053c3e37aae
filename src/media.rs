use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::blob::BlobStore;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::session::SessionContext;

/// A blob picked up from the device, ready to upload.
#[derive(Clone, Debug)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Capture glue: turns a device blob into a durable locator BEFORE the
/// record referencing it is written. A failed upload propagates and the
/// owning record write never happens, so live observers never see a
/// dangling reference.
#[derive(Clone)]
pub struct MediaService {
    blobs: Arc<dyn BlobStore>,
    session: SessionContext,
}

impl MediaService {
    pub fn new(blobs: Arc<dyn BlobStore>, session: SessionContext) -> Self {
        Self { blobs, session }
    }

    /// Upload under `{uid}/{purpose}/{millis}` and resolve the locator.
    pub async fn upload(&self, purpose: &str, upload: MediaUpload) -> Result<String> {
        let user = self.session.current_user().await?;

        if upload.bytes.is_empty() {
            return Err(Error::Validation("media blob is empty".to_string()));
        }

        let path = format!(
            "{}/{}/{}",
            user.uid,
            purpose,
            Utc::now().timestamp_millis()
        );
        self.store_and_resolve(&path, upload, purpose).await
    }

    /// Upload under a fixed per-user object name, e.g. `{uid}/profile.jpg`.
    pub async fn upload_named(&self, name: &str, upload: MediaUpload) -> Result<String> {
        let user = self.session.current_user().await?;

        if upload.bytes.is_empty() {
            return Err(Error::Validation("media blob is empty".to_string()));
        }

        let path = format!("{}/{}.jpg", user.uid, name);
        self.store_and_resolve(&path, upload, name).await
    }

    async fn store_and_resolve(
        &self,
        path: &str,
        upload: MediaUpload,
        purpose: &str,
    ) -> Result<String> {
        self.blobs.put(path, upload.bytes).await?;
        let locator = self.blobs.download_url(path).await?;

        Metrics::media_uploaded(purpose);
        debug!(path, "media uploaded");

        Ok(locator)
    }
}
