use std::sync::Arc;

use crate::blob::BlobStore;
use crate::calls::CallService;
use crate::chat_service::ChatService;
use crate::error::{Error, Result};
use crate::feed::FeedService;
use crate::media::MediaService;
use crate::profile::ProfileService;
use crate::session::{AuthProvider, SessionContext};
use crate::stories::StoryService;
use crate::store::DocumentStore;

/// One client's view of the app: a session plus the services bound to it.
/// Collaborator handles are shared, so several `App`s (one per user) can
/// run against the same backend.
pub struct App {
    pub session: SessionContext,
    pub chat: ChatService,
    pub feed: FeedService,
    pub stories: StoryService,
    pub calls: CallService,
    pub profile: ProfileService,
    pub media: MediaService,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }
}

/// Explicit collaborator injection; there is no global backend handle.
pub struct AppBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    auth: Option<Arc<dyn AuthProvider>>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            auth: None,
            blobs: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn build(self) -> Result<App> {
        let store = self
            .store
            .ok_or(Error::Config("document store collaborator required"))?;
        let auth = self
            .auth
            .ok_or(Error::Config("auth collaborator required"))?;
        let blobs = self
            .blobs
            .ok_or(Error::Config("object storage collaborator required"))?;

        let session = SessionContext::new(auth);
        let media = MediaService::new(blobs, session.clone());

        Ok(App {
            chat: ChatService::new(store.clone(), session.clone(), media.clone()),
            feed: FeedService::new(store.clone(), session.clone(), media.clone()),
            stories: StoryService::new(store.clone(), session.clone(), media.clone()),
            calls: CallService::new(store.clone(), session.clone()),
            profile: ProfileService::new(store, session.clone(), media.clone()),
            media,
            session,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::memory::{MemoryAuth, MemoryBlobs, MemoryStore};

    #[tokio::test]
    async fn builder_requires_every_collaborator() {
        let result = App::builder()
            .with_auth(Arc::new(MemoryAuth::new()))
            .with_blobs(Arc::new(MemoryBlobs::new()))
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn builder_wires_a_working_app() {
        let app = App::builder()
            .with_store(Arc::new(MemoryStore::spawn()))
            .with_auth(Arc::new(MemoryAuth::new()))
            .with_blobs(Arc::new(MemoryBlobs::new()))
            .build()
            .unwrap();

        assert!(app.session.current_user().await.is_err());
    }
}
