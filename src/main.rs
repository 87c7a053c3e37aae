use std::sync::Arc;

use plume::calls::{CallFilter, CallKind, CallStatus};
use plume::chat::MessageKind;
use plume::media::MediaUpload;
use plume::memory::{MemoryAuth, MemoryBlobs, MemoryStore};
use plume::session::NewUser;
use plume::{App, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn signed_in_app(
    store: &MemoryStore,
    auth: &Arc<MemoryAuth>,
    blobs: &Arc<MemoryBlobs>,
    email: &str,
    username: &str,
) -> App {
    let app = App::builder()
        .with_store(Arc::new(store.clone()))
        .with_auth(auth.clone())
        .with_blobs(blobs.clone())
        .build()
        .unwrap();

    app.session
        .sign_up(NewUser {
            email: email.to_string(),
            password: "demo-password".to_string(),
            display_name: username.to_string(),
        })
        .await
        .unwrap();
    app.session.sign_in(email, "demo-password").await.unwrap();
    app.profile.create_profile(username, username).await.unwrap();

    app
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = MemoryStore::spawn();
    let auth = Arc::new(MemoryAuth::new());
    let blobs = Arc::new(MemoryBlobs::new());

    let alice = signed_in_app(&store, &auth, &blobs, "alice@example.com", "alice").await;
    let bob = signed_in_app(&store, &auth, &blobs, "bob@example.com", "bob").await;

    let alice_uid = alice.session.current_user().await.unwrap().uid;
    let bob_uid = bob.session.current_user().await.unwrap().uid;

    // Both sides resolve the same conversation, whoever asks first.
    let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();
    assert_eq!(chat_id, bob.chat.start_chat(&alice_uid).await.unwrap());
    tracing::info!(%chat_id, "conversation resolved from both perspectives");

    let mut bob_view = bob.chat.watch_messages(&chat_id).await.unwrap();

    alice.chat.send_text(&chat_id, "hey bob").await.unwrap();
    alice
        .chat
        .send_media(&chat_id, MessageKind::Image, MediaUpload::new(vec![0xFF; 64]))
        .await
        .unwrap();
    bob.chat.send_text(&chat_id, "hey alice").await.unwrap();

    // Drain a few live snapshots; each one is the full ordered set.
    for _ in 0..3 {
        if let Some(snapshot) = bob_view.next().await {
            let preview: Vec<&str> = snapshot.iter().map(|m| m.text.as_str()).collect();
            tracing::info!(messages = snapshot.len(), ?preview, "bob's live view");
        }
    }
    bob_view.stop();

    let post = alice
        .feed
        .create_post("first post", Some(MediaUpload::new(vec![0xAB; 128])))
        .await
        .unwrap();
    bob.feed.like_post(&post.id).await.unwrap();
    bob.feed.add_comment(&post.id, "welcome!").await.unwrap();

    let mut feed = bob.feed.watch_feed().await.unwrap();
    if let Some(posts) = feed.next().await {
        tracing::info!(posts = posts.len(), "feed snapshot");
    }
    feed.stop();

    alice
        .stories
        .create_story(MediaUpload::new(vec![0xCD; 32]))
        .await
        .unwrap();

    alice
        .calls
        .record_call(&bob_uid, CallKind::Outgoing, CallStatus::Missed, None)
        .await
        .unwrap();
    let mut missed = alice.calls.watch_calls(CallFilter::Missed).await.unwrap();
    if let Some(calls) = missed.next().await {
        tracing::info!(missed = calls.len(), "missed calls");
    }
    missed.stop();

    println!("{}", metrics::render().unwrap());
}
