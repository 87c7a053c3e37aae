use std::sync::Arc;

use crate::memory::{MemoryAuth, MemoryBlobs, MemoryStore};
use crate::session::NewUser;
use crate::state::App;

/// Shared in-memory backend for multi-user test scenarios.
pub struct Backend {
    pub store: MemoryStore,
    pub auth: Arc<MemoryAuth>,
    pub blobs: Arc<MemoryBlobs>,
}

pub fn backend() -> Backend {
    Backend {
        store: MemoryStore::spawn(),
        auth: Arc::new(MemoryAuth::new()),
        blobs: Arc::new(MemoryBlobs::new()),
    }
}

/// App for one user: signed up, signed in, users document written.
pub async fn signed_in_app(backend: &Backend, email: &str, username: &str) -> App {
    let app = App::builder()
        .with_store(Arc::new(backend.store.clone()))
        .with_auth(backend.auth.clone())
        .with_blobs(backend.blobs.clone())
        .build()
        .unwrap();

    app.session
        .sign_up(NewUser {
            email: email.to_string(),
            password: "pw".to_string(),
            display_name: username.to_string(),
        })
        .await
        .unwrap();
    app.session.sign_in(email, "pw").await.unwrap();
    app.profile.create_profile(username, username).await.unwrap();

    app
}
