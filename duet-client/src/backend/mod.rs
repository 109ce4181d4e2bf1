//! Backend abstraction for duet.
//!
//! The engine owns no server logic. It is a client of four primitives that
//! any realtime-capable backend (hosted realtime database, custom WebSocket
//! gateway, in-memory for tests) can provide:
//!
//! - [`Directory`] lists accepted connections
//! - [`MessageStore`] persists messages and read receipts
//! - [`ChangeFeed`] pushes insert/update events for a filter
//! - [`Realtime`] provides ephemeral channels with presence and broadcast
//!
//! # Example
//!
//! ```ignore
//! let backend = MemoryBackend::new();
//! let feed = backend.subscribe(ChangeFilter::Recipient(me.clone())).await?;
//! let sent = backend.insert(NewMessage { .. }).await?;
//! let event = feed.events.recv().await;
//! ```

mod memory;

pub use memory::MemoryBackend;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use duet_types::{
    Broadcast, ChannelEvent, Connection, ConversationKey, Message, MessageId, NewMessage,
    PresenceMeta, RawChange, Timestamp, TypesError, UserId,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Request was refused (permissions, constraint violation).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Subscription or channel handle is not (or no longer) registered.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    /// Payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] TypesError),
}

/// Handle identifying a change-feed subscription or a channel membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Create a SubscriptionId from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Server-side predicate for a change-feed subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    /// Every change between the two users of a conversation.
    Pair(ConversationKey),
    /// Every change addressed to a user.
    Recipient(UserId),
}

impl ChangeFilter {
    /// Whether a change to `message` passes this filter.
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            ChangeFilter::Pair(key) => key.matches(&message.sender_id, &message.recipient_id),
            ChangeFilter::Recipient(user) => &message.recipient_id == user,
        }
    }
}

/// An open change-feed subscription.
#[derive(Debug)]
pub struct FeedSubscription {
    /// Handle used to unsubscribe.
    pub id: SubscriptionId,
    /// Raw change payloads, validated by the consumer.
    pub events: mpsc::UnboundedReceiver<RawChange>,
}

/// Membership of an ephemeral channel.
#[derive(Debug)]
pub struct ChannelSubscription {
    /// Handle used for track/broadcast/leave.
    pub id: SubscriptionId,
    /// Channel name.
    pub channel: String,
    /// Presence syncs and broadcasts from other members.
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Unread counts keyed by sender, as of a store time.
///
/// Every unread message created at or before `as_of` is counted; a change
/// event for a message created later is not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadSnapshot {
    /// Unread messages per sender.
    pub counts: HashMap<UserId, u32>,
    /// Creation time of the newest message the snapshot accounts for.
    pub as_of: Timestamp,
}

/// Directory of accepted connections.
#[async_trait]
pub trait Directory: Send + Sync {
    /// List accepted connections where `user` is either side.
    async fn accepted_connections(&self, user: &UserId) -> Result<Vec<Connection>, BackendError>;
}

/// Persistent message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message; returns the stored record with id and timestamp.
    async fn insert(&self, message: NewMessage) -> Result<Message, BackendError>;

    /// Full history of a conversation, ascending by creation time.
    async fn history(&self, key: &ConversationKey) -> Result<Vec<Message>, BackendError>;

    /// Set `read_at = at` on every message from `sender` to `recipient` that
    /// has no read time yet. Returns the number of messages changed.
    async fn mark_read(
        &self,
        sender: &UserId,
        recipient: &UserId,
        at: Timestamp,
    ) -> Result<u64, BackendError>;

    /// Delete a message by id.
    async fn delete(&self, id: &MessageId) -> Result<(), BackendError>;

    /// Unread message counts addressed to `recipient`, keyed by sender.
    async fn unread_by_sender(&self, recipient: &UserId) -> Result<UnreadSnapshot, BackendError>;
}

/// Push stream of message-store changes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to changes passing `filter`.
    async fn subscribe(&self, filter: ChangeFilter) -> Result<FeedSubscription, BackendError>;

    /// Stop delivering to a subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError>;
}

/// Ephemeral pub/sub channels with presence.
#[async_trait]
pub trait Realtime: Send + Sync {
    /// Join a channel by name.
    async fn join(&self, channel: &str) -> Result<ChannelSubscription, BackendError>;

    /// Register presence for this membership; every member receives a sync.
    async fn track(&self, id: SubscriptionId, meta: PresenceMeta) -> Result<(), BackendError>;

    /// Drop the presence registration of this membership.
    async fn untrack(&self, id: SubscriptionId) -> Result<(), BackendError>;

    /// Fire-and-forget broadcast to the other members of the channel.
    async fn broadcast(&self, id: SubscriptionId, payload: Broadcast) -> Result<(), BackendError>;

    /// Leave the channel.
    async fn leave(&self, id: SubscriptionId) -> Result<(), BackendError>;
}

/// Everything the engine needs from a backend.
pub trait Backend: Directory + MessageStore + ChangeFeed + Realtime + Clone + 'static {}

impl<T> Backend for T where T: Directory + MessageStore + ChangeFeed + Realtime + Clone + 'static {}
