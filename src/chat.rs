use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::Document;

/// Deterministic conversation id for an unordered participant pair. Both
/// sides derive the same key, so resolution is a point read and
/// concurrent first contact cannot fork the conversation.
pub fn conversation_key(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{}_{}", first, second)
}

/// A two-party conversation record. Created lazily on first contact,
/// never deleted. `user_names` is a denormalized convenience copy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(skip)]
    pub id: String,
    pub user_ids: Vec<String>,
    pub user_names: Vec<String>,
    pub last_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Conversation {
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut conversation: Conversation = serde_json::from_value(doc.data)?;
        conversation.id = doc.id;
        Ok(conversation)
    }

    pub fn other_participant(&self, uid: &str) -> Option<&str> {
        self.user_ids
            .iter()
            .map(String::as_str)
            .find(|id| *id != uid)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Voice,
    Image,
    Video,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Voice => "voice",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
        }
    }

    /// Placeholder text stored with non-text messages.
    pub fn placeholder(&self) -> &'static str {
        match self {
            MessageKind::Text => "",
            MessageKind::Voice => "Voice message",
            MessageKind::Image => "Image message",
            MessageKind::Video => "Video message",
        }
    }
}

/// One message in a conversation. Immutable once written; `sent_at`
/// (epoch milliseconds at submission) is the sole ordering key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub recipient_id: String,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub sent_at: i64,
    pub read: bool,
    pub reactions: Vec<String>,
}

impl Message {
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut message: Message = serde_json::from_value(doc.data)?;
        message.id = doc.id;
        Ok(message)
    }
}
