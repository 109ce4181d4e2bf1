//! Direct messages as persisted by the message store.

use serde::{Deserialize, Serialize};

use crate::{ConversationKey, MessageId, Timestamp, UserId};

/// Media reference attached to a message.
///
/// Upload mechanics live outside the engine; only the resulting URL is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    /// An uploaded image
    Image {
        /// Public URL of the image
        url: String,
    },
    /// An uploaded voice note
    Audio {
        /// Public URL of the audio clip
        url: String,
    },
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server UUID, or a `temp-` placeholder before confirmation
    pub id: MessageId,
    /// Author of the message
    pub sender_id: UserId,
    /// Addressee of the message
    pub recipient_id: UserId,
    /// Text body (may be empty when only an attachment is sent)
    pub content: String,
    /// Optional media reference
    #[serde(default)]
    pub attachment: Option<Attachment>,
    /// Creation time
    pub created_at: Timestamp,
    /// Set once the recipient has read the message
    #[serde(default)]
    pub read_at: Option<Timestamp>,
}

impl Message {
    /// Whether `user` authored this message.
    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender_id == user
    }

    /// Whether this is an unconfirmed local placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.id.is_placeholder()
    }

    /// Whether the recipient has not acknowledged this message yet.
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }

    /// The conversation this message belongs to.
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(&self.sender_id, &self.recipient_id)
    }
}

/// Insert request sent to the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Author of the message
    pub sender_id: UserId,
    /// Addressee of the message
    pub recipient_id: UserId,
    /// Text body
    pub content: String,
    /// Optional media reference
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    /// Build the insert request matching a local placeholder.
    pub fn from_placeholder(message: &Message) -> Self {
        Self {
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            content: message.content.clone(),
            attachment: message.attachment.clone(),
        }
    }
}
