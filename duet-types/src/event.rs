//! Push payloads delivered by the realtime backend.
//!
//! The change feed hands out loosely typed [`RawChange`] records; they are
//! validated into [`ChangeEvent`] at the subscription boundary so the rest of
//! the engine only ever sees a well-formed [`Message`].

use serde::{Deserialize, Serialize};

use crate::{Message, Timestamp, TypesError, UserId};

const KIND_INSERT: &str = "INSERT";
const KIND_UPDATE: &str = "UPDATE";

/// A change record as it arrives on the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    /// Event kind (`INSERT` or `UPDATE`)
    pub kind: String,
    /// The new row
    pub record: serde_json::Value,
}

impl RawChange {
    /// Encode an insert of `message`.
    pub fn inserted(message: &Message) -> Result<Self, TypesError> {
        Self::encode(KIND_INSERT, message)
    }

    /// Encode an update of `message`.
    pub fn updated(message: &Message) -> Result<Self, TypesError> {
        Self::encode(KIND_UPDATE, message)
    }

    fn encode(kind: &str, message: &Message) -> Result<Self, TypesError> {
        Ok(Self {
            kind: kind.to_string(),
            record: serde_json::to_value(message).map_err(TypesError::Encode)?,
        })
    }
}

/// A validated change to the message store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A message was persisted
    Inserted(Message),
    /// A persisted message changed (read receipts)
    Updated(Message),
}

impl ChangeEvent {
    /// The message carried by this event.
    pub fn message(&self) -> &Message {
        match self {
            ChangeEvent::Inserted(m) | ChangeEvent::Updated(m) => m,
        }
    }
}

impl TryFrom<RawChange> for ChangeEvent {
    type Error = TypesError;

    fn try_from(raw: RawChange) -> Result<Self, Self::Error> {
        let decode = |record: serde_json::Value| {
            serde_json::from_value::<Message>(record).map_err(TypesError::InvalidRecord)
        };
        match raw.kind.as_str() {
            KIND_INSERT => Ok(ChangeEvent::Inserted(decode(raw.record)?)),
            KIND_UPDATE => Ok(ChangeEvent::Updated(decode(raw.record)?)),
            other => Err(TypesError::UnknownChangeKind(other.to_string())),
        }
    }
}

/// Presence registration carried on the shared presence channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    /// Registered user
    pub user_id: UserId,
    /// When the registration was made
    pub online_at: Timestamp,
}

/// Fire-and-forget payload sent over an ephemeral channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Broadcast {
    /// The sender is typing in the pair's conversation
    Typing {
        /// Who is typing
        user_id: UserId,
    },
}

/// Events delivered to a member of an ephemeral channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Full presence snapshot of the channel
    Sync {
        /// Every registration currently held on the channel
        members: Vec<PresenceMeta>,
    },
    /// A broadcast from another member
    Broadcast(Broadcast),
}
