use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::{Conversation, Message, MessageKind, conversation_key};
use crate::error::{Error, Result};
use crate::live::Live;
use crate::media::{MediaService, MediaUpload};
use crate::metrics::Metrics;
use crate::profile;
use crate::session::SessionContext;
use crate::store::{CollectionPath, Direction, DocumentStore, Filter, Query};

pub const CHATS: &str = "chats";
const MESSAGES: &str = "messages";

pub type MessageStream = Live<Message>;
pub type ConversationStream = Live<Conversation>;

/// One-to-one chat: resolve-or-create conversations and append/observe
/// their messages. All state lives in the document store collaborator.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    media: MediaService,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: SessionContext,
        media: MediaService,
    ) -> Self {
        Self {
            store,
            session,
            media,
        }
    }

    /// Conversation id between the caller and `receiver_id`, created on
    /// first contact. The id is derived from the sorted pair, so both
    /// sides resolve to the same record and concurrent first contact
    /// collapses onto one conversation via put-if-absent.
    pub async fn start_chat(&self, receiver_id: &str) -> Result<String> {
        let user = self.session.current_user().await?;

        if receiver_id.trim().is_empty() {
            return Err(Error::Validation("receiver id is empty".to_string()));
        }
        if receiver_id == user.uid {
            return Err(Error::Validation(
                "cannot start a chat with yourself".to_string(),
            ));
        }

        let chats = CollectionPath::root(CHATS);
        let key = conversation_key(&user.uid, receiver_id);

        if self.store.get(&chats, &key).await?.is_some() {
            debug!(conversation = %key, "conversation already resolved");
            return Ok(key);
        }

        let (receiver_name, _) = profile::display_identity(self.store.as_ref(), receiver_id).await;
        let (user_ids, user_names) = if user.uid.as_str() <= receiver_id {
            (
                vec![user.uid.clone(), receiver_id.to_string()],
                vec![user.display_name.clone(), receiver_name],
            )
        } else {
            (
                vec![receiver_id.to_string(), user.uid.clone()],
                vec![receiver_name, user.display_name.clone()],
            )
        };

        let now = Utc::now().timestamp_millis();
        let record = json!({
            "user_ids": user_ids,
            "user_names": user_names,
            "last_message": null,
            "created_at": now,
            "updated_at": now,
        });

        if self.store.create(&chats, &key, record).await? {
            info!(conversation = %key, "conversation created");
        } else {
            // The other side won the race; the record is the same one.
            debug!(conversation = %key, "conversation created concurrently");
        }

        Ok(key)
    }

    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(Error::Validation("message text is empty".to_string()));
        }
        self.append(chat_id, MessageKind::Text, text.to_string(), None)
            .await
    }

    /// Upload the blob first; only a resolved locator gets persisted.
    pub async fn send_media(
        &self,
        chat_id: &str,
        kind: MessageKind,
        upload: MediaUpload,
    ) -> Result<Message> {
        if kind == MessageKind::Text {
            return Err(Error::Validation(
                "text messages carry no media".to_string(),
            ));
        }

        let locator = self.media.upload("messages", upload).await?;
        self.append(chat_id, kind, kind.placeholder().to_string(), Some(locator))
            .await
    }

    async fn append(
        &self,
        chat_id: &str,
        kind: MessageKind,
        text: String,
        media_url: Option<String>,
    ) -> Result<Message> {
        let user = self.session.current_user().await?;

        let chats = CollectionPath::root(CHATS);
        let doc = self
            .store
            .get(&chats, chat_id)
            .await?
            .ok_or(Error::NotFound("conversation"))?;
        let conversation = Conversation::from_document(doc)?;

        if !conversation.user_ids.iter().any(|id| *id == user.uid) {
            return Err(Error::Validation(
                "sender is not a participant".to_string(),
            ));
        }
        let recipient_id = conversation
            .other_participant(&user.uid)
            .unwrap_or_default()
            .to_string();

        let message = Message {
            id: Uuid::new_v4().to_string(),
            text,
            sender_id: user.uid.clone(),
            sender_name: user.display_name.clone(),
            sender_avatar: user.avatar_url.clone(),
            recipient_id,
            kind,
            media_url,
            sent_at: Utc::now().timestamp_millis(),
            read: false,
            reactions: Vec::new(),
        };

        let messages = CollectionPath::nested(CHATS, chat_id, MESSAGES);
        let payload = serde_json::to_value(&message)?;
        self.store.create(&messages, &message.id, payload).await?;

        Metrics::message_sent(message.kind.as_str());
        info!(conversation = chat_id, kind = kind.as_str(), "message appended");

        // Preview refresh is best-effort; the message itself is durable.
        let patch = json!({
            "last_message": message.text,
            "updated_at": message.sent_at,
        });
        if let Err(e) = self.store.update(&chats, chat_id, patch).await {
            warn!(
                conversation = chat_id,
                "failed to refresh conversation preview: {}", e
            );
        }

        Ok(message)
    }

    /// Live time-ordered view of a conversation. Explicitly stoppable;
    /// appends made after `stop()` never reach this observer.
    pub async fn watch_messages(&self, chat_id: &str) -> Result<MessageStream> {
        self.session.current_user().await?;

        let chats = CollectionPath::root(CHATS);
        if self.store.get(&chats, chat_id).await?.is_none() {
            return Err(Error::NotFound("conversation"));
        }

        let query = Query::collection(CollectionPath::nested(CHATS, chat_id, MESSAGES))
            .order_by("sent_at", Direction::Ascending);
        Live::open(self.store.clone(), query, Message::from_document).await
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        let user = self.session.current_user().await?;

        let docs = self.store.query(&Self::conversations_query(&user.uid)).await?;
        docs.into_iter().map(Conversation::from_document).collect()
    }

    pub async fn watch_conversations(&self) -> Result<ConversationStream> {
        let user = self.session.current_user().await?;

        Live::open(
            self.store.clone(),
            Self::conversations_query(&user.uid),
            Conversation::from_document,
        )
        .await
    }

    fn conversations_query(uid: &str) -> Query {
        Query::collection(CollectionPath::root(CHATS))
            .filter(Filter::ArrayContains("user_ids".to_string(), json!(uid)))
            .order_by("updated_at", Direction::Descending)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn both_perspectives_resolve_the_same_conversation() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let alice_uid = alice.session.current_user().await.unwrap().uid;
        let bob_uid = bob.session.current_user().await.unwrap().uid;

        let from_alice = alice.chat.start_chat(&bob_uid).await.unwrap();
        let from_bob = bob.chat.start_chat(&alice_uid).await.unwrap();

        assert_eq!(from_alice, from_bob);
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_exactly_one_conversation() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let alice_uid = alice.session.current_user().await.unwrap().uid;
        let bob_uid = bob.session.current_user().await.unwrap().uid;

        let (a, b) = tokio::join!(
            alice.chat.start_chat(&bob_uid),
            bob.chat.start_chat(&alice_uid)
        );
        assert_eq!(a.unwrap(), b.unwrap());

        let records = alice.chat.conversations().await.unwrap();
        assert_eq!(records.len(), 1);
        let mut ids = records[0].user_ids.clone();
        ids.sort();
        let mut expected = vec![alice_uid, bob_uid];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn first_message_reaches_the_recipients_view() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();

        alice.chat.send_text(&chat_id, "hello").await.unwrap();

        let mut view = bob.chat.watch_messages(&chat_id).await.unwrap();
        let snapshot = view.next().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "hello");
        assert_eq!(snapshot[0].kind, MessageKind::Text);
        assert!(!snapshot[0].read);
        assert!(snapshot[0].reactions.is_empty());
        assert_eq!(snapshot[0].recipient_id, bob_uid);
    }

    #[tokio::test]
    async fn observing_yields_all_messages_in_timestamp_order() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();

        for i in 0..5 {
            alice
                .chat
                .send_text(&chat_id, &format!("message {}", i))
                .await
                .unwrap();
        }

        let mut view = bob.chat.watch_messages(&chat_id).await.unwrap();
        let snapshot = view.next().await.unwrap();

        assert_eq!(snapshot.len(), 5);
        for pair in snapshot.windows(2) {
            assert!(pair[0].sent_at <= pair[1].sent_at);
        }
        let texts: Vec<&str> = snapshot.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["message 0", "message 1", "message 2", "message 3", "message 4"]
        );
    }

    #[tokio::test]
    async fn stopping_a_view_stops_delivery() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();
        alice.chat.send_text(&chat_id, "before").await.unwrap();

        let mut view = bob.chat.watch_messages(&chat_id).await.unwrap();
        assert_eq!(view.next().await.unwrap().len(), 1);

        view.stop();
        alice.chat.send_text(&chat_id, "after").await.unwrap();

        assert!(view.next().await.is_none());
    }

    #[tokio::test]
    async fn unauthenticated_append_fails_and_writes_nothing() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();

        alice.session.sign_out().await.unwrap();
        let result = alice.chat.send_text(&chat_id, "ghost").await;
        assert!(matches!(result, Err(Error::Unauthenticated)));

        let mut view = bob.chat.watch_messages(&chat_id).await.unwrap();
        assert!(view.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_message_text_is_rejected() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();

        assert!(matches!(
            alice.chat.send_text(&chat_id, "   ").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_is_not_found() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;

        assert!(matches!(
            alice.chat.send_text("nope", "hello").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_media_upload_aborts_the_message() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();

        backend.blobs.fail_uploads(true);
        let result = alice
            .chat
            .send_media(&chat_id, MessageKind::Image, MediaUpload::new(vec![9]))
            .await;
        assert!(matches!(result, Err(Error::Transient(_))));

        let mut view = bob.chat.watch_messages(&chat_id).await.unwrap();
        assert!(view.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn media_message_carries_a_resolved_locator() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();

        let message = alice
            .chat
            .send_media(&chat_id, MessageKind::Voice, MediaUpload::new(vec![1, 2]))
            .await
            .unwrap();

        assert_eq!(message.kind, MessageKind::Voice);
        assert_eq!(message.text, "Voice message");
        assert!(message.media_url.unwrap().starts_with("mem://"));
    }

    #[tokio::test]
    async fn unreachable_store_surfaces_a_transient_error() {
        let (actor, store) = crate::memory::StoreActor::new();
        drop(actor);

        let app = crate::App::builder()
            .with_store(Arc::new(store))
            .with_auth(Arc::new(crate::memory::MemoryAuth::new()))
            .with_blobs(Arc::new(crate::memory::MemoryBlobs::new()))
            .build()
            .unwrap();

        app.session
            .sign_up(crate::session::NewUser {
                email: "ada@example.com".to_string(),
                password: "pw".to_string(),
                display_name: "ada".to_string(),
            })
            .await
            .unwrap();
        app.session.sign_in("ada@example.com", "pw").await.unwrap();

        assert!(matches!(
            app.chat.start_chat("someone").await,
            Err(Error::Transient(_))
        ));
    }

    #[tokio::test]
    async fn starting_a_chat_with_yourself_is_rejected() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let uid = alice.session.current_user().await.unwrap().uid;

        assert!(matches!(
            alice.chat.start_chat(&uid).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn conversation_list_updates_live_on_first_contact() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let alice_uid = alice.session.current_user().await.unwrap().uid;

        let mut list = bob.chat.watch_conversations().await.unwrap();
        assert!(list.next().await.unwrap().is_empty());

        let chat_id = bob.chat.start_chat(&alice_uid).await.unwrap();

        let snapshot = list.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, chat_id);
        assert!(snapshot[0].user_ids.contains(&alice_uid));
        assert!(snapshot[0].user_names.contains(&"alice".to_string()));
    }

    #[tokio::test]
    async fn sends_refresh_the_conversation_preview() {
        let backend = testutil::backend();
        let alice = testutil::signed_in_app(&backend, "alice@example.com", "alice").await;
        let bob = testutil::signed_in_app(&backend, "bob@example.com", "bob").await;

        let bob_uid = bob.session.current_user().await.unwrap().uid;
        let chat_id = alice.chat.start_chat(&bob_uid).await.unwrap();
        alice.chat.send_text(&chat_id, "newest").await.unwrap();

        let conversations = bob.chat.conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, chat_id);
        assert_eq!(conversations[0].last_message.as_deref(), Some("newest"));
    }
}
