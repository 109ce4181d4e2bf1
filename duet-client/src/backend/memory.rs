//! In-memory backend for tests and demos.
//!
//! Implements every backend trait over shared state. Allows injecting
//! failures and latency, holding change events back, and inspecting what the
//! engine sent.

use super::{
    BackendError, ChangeFeed, ChangeFilter, ChannelSubscription, Directory, FeedSubscription,
    MessageStore, Realtime, SubscriptionId, UnreadSnapshot,
};
use async_trait::async_trait;
use duet_types::{
    Broadcast, ChannelEvent, Connection, ConnectionStatus, ConversationKey, Message, MessageId,
    NewMessage, PresenceMeta, RawChange, Timestamp, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory backend.
///
/// Clones share state, so one instance can serve several sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryBackendInner>>,
}

#[derive(Debug, Default)]
struct MemoryBackendInner {
    connections: Vec<Connection>,
    messages: Vec<Message>,
    clock: u64,
    next_subscription: u64,
    feeds: BTreeMap<SubscriptionId, Feed>,
    members: BTreeMap<SubscriptionId, Member>,
    held: Option<Vec<(RawChange, Message)>>,
    broadcasts: Vec<(String, Broadcast)>,
    insert_delay: Option<Duration>,
    ack_delay: Option<Duration>,
    history_delay: Option<Duration>,
    mark_read_delay: Option<Duration>,
    fail_next_directory: Option<String>,
    fail_next_insert: Option<String>,
    fail_next_history: Option<String>,
    fail_next_mark_read: Option<String>,
    fail_next_delete: Option<String>,
    fail_next_join: Option<String>,
    fail_next_subscribe: Option<String>,
    fail_next_unread: Option<String>,
    fail_next_track: Option<String>,
}

#[derive(Debug)]
struct Feed {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<RawChange>,
}

#[derive(Debug)]
struct Member {
    channel: String,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    presence: Option<PresenceMeta>,
}

impl MemoryBackendInner {
    fn subscription_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId::new(self.next_subscription)
    }

    /// Strictly increasing store clock.
    fn timestamp(&mut self) -> Timestamp {
        self.clock = Timestamp::now().millis().max(self.clock + 1);
        Timestamp::from_millis(self.clock)
    }

    fn emit(&mut self, raw: RawChange, message: Message) {
        match self.held.as_mut() {
            Some(held) => held.push((raw, message)),
            None => self.fan_out(&raw, &message),
        }
    }

    fn fan_out(&mut self, raw: &RawChange, message: &Message) {
        self.feeds.retain(|_, feed| !feed.tx.is_closed());
        for feed in self.feeds.values() {
            if feed.filter.matches(message) {
                let _ = feed.tx.send(raw.clone());
            }
        }
    }

    fn snapshot(&self, channel: &str) -> Vec<PresenceMeta> {
        self.members
            .values()
            .filter(|m| m.channel == channel)
            .filter_map(|m| m.presence.clone())
            .collect()
    }

    /// Send the full presence snapshot to every member of `channel`.
    fn sync(&self, channel: &str) {
        let members = self.snapshot(channel);
        for member in self.members.values().filter(|m| m.channel == channel) {
            let _ = member.tx.send(ChannelEvent::Sync {
                members: members.clone(),
            });
        }
    }

    fn member_mut(&mut self, id: SubscriptionId) -> Result<&mut Member, BackendError> {
        self.members
            .get_mut(&id)
            .ok_or(BackendError::UnknownSubscription(id))
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection record.
    pub fn add_connection(&self, connection: Connection) {
        let mut inner = self.inner.lock().unwrap();
        inner.connections.push(connection);
    }

    /// Store a message as-is without emitting change events.
    pub fn seed_message(&self, message: Message) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock = inner.clock.max(message.created_at.millis());
        inner.messages.push(message);
    }

    /// All stored messages in insertion order.
    pub fn messages(&self) -> Vec<Message> {
        let inner = self.inner.lock().unwrap();
        inner.messages.clone()
    }

    /// Look up a stored message.
    pub fn message(&self, id: &MessageId) -> Option<Message> {
        let inner = self.inner.lock().unwrap();
        inner.messages.iter().find(|m| &m.id == id).cloned()
    }

    /// Number of open change-feed subscriptions.
    pub fn feed_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.feeds.retain(|_, feed| !feed.tx.is_closed());
        inner.feeds.len()
    }

    /// Number of members currently joined to `channel`.
    pub fn channel_members(&self, channel: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.members.values().filter(|m| m.channel == channel).count()
    }

    /// Presence registrations currently held on `channel`.
    pub fn presence(&self, channel: &str) -> Vec<PresenceMeta> {
        let inner = self.inner.lock().unwrap();
        inner.snapshot(channel)
    }

    /// Broadcasts sent on `channel`, oldest first.
    pub fn broadcasts(&self, channel: &str) -> Vec<Broadcast> {
        let inner = self.inner.lock().unwrap();
        inner
            .broadcasts
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Queue change events instead of delivering them.
    pub fn hold_changes(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.held.get_or_insert_with(Vec::new);
    }

    /// Deliver queued change events in commit order and stop holding.
    ///
    /// Returns the number of events released.
    pub fn release_changes(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let held = inner.held.take().unwrap_or_default();
        for (raw, message) in &held {
            inner.fan_out(raw, message);
        }
        held.len()
    }

    /// Deliver an arbitrary payload to every open change feed.
    pub fn inject_raw(&self, raw: RawChange) {
        let mut inner = self.inner.lock().unwrap();
        inner.feeds.retain(|_, feed| !feed.tx.is_closed());
        for feed in inner.feeds.values() {
            let _ = feed.tx.send(raw.clone());
        }
    }

    /// Delay every insert by `delay`.
    pub fn set_insert_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().insert_delay = Some(delay);
    }

    /// Delay the result of every insert by `delay` after its change event
    /// has been emitted.
    pub fn set_ack_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().ack_delay = Some(delay);
    }

    /// Delay every history fetch by `delay`.
    pub fn set_history_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().history_delay = Some(delay);
    }

    /// Delay every mark-read by `delay`.
    pub fn set_mark_read_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().mark_read_delay = Some(delay);
    }

    /// Cause the next directory query to fail.
    pub fn fail_next_directory(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_directory = Some(error.to_string());
    }

    /// Cause the next insert to fail.
    pub fn fail_next_insert(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_insert = Some(error.to_string());
    }

    /// Cause the next history fetch to fail.
    pub fn fail_next_history(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_history = Some(error.to_string());
    }

    /// Cause the next mark-read to fail.
    pub fn fail_next_mark_read(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_mark_read = Some(error.to_string());
    }

    /// Cause the next delete to fail.
    pub fn fail_next_delete(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_delete = Some(error.to_string());
    }

    /// Cause the next unread snapshot to fail.
    pub fn fail_next_unread(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_unread = Some(error.to_string());
    }

    /// Cause the next channel join to fail.
    pub fn fail_next_join(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_join = Some(error.to_string());
    }

    /// Cause the next presence registration to fail.
    pub fn fail_next_track(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_track = Some(error.to_string());
    }

    /// Cause the next change-feed subscription to fail.
    pub fn fail_next_subscribe(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_subscribe = Some(error.to_string());
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

async fn maybe_sleep(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Directory for MemoryBackend {
    async fn accepted_connections(&self, user: &UserId) -> Result<Vec<Connection>, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_directory.take() {
            return Err(BackendError::Unavailable(error));
        }

        Ok(inner
            .connections
            .iter()
            .filter(|c| c.status == ConnectionStatus::Accepted && c.other_side(user).is_some())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn insert(&self, message: NewMessage) -> Result<Message, BackendError> {
        let delay = self.inner.lock().unwrap().insert_delay;
        maybe_sleep(delay).await;

        let (stored, ack_delay) = {
            let mut inner = self.inner.lock().unwrap();

            if let Some(error) = inner.fail_next_insert.take() {
                return Err(BackendError::Rejected(error));
            }

            let stored = Message {
                id: MessageId::random(),
                sender_id: message.sender_id,
                recipient_id: message.recipient_id,
                content: message.content,
                attachment: message.attachment,
                created_at: inner.timestamp(),
                read_at: None,
            };
            let raw = RawChange::inserted(&stored)?;
            inner.messages.push(stored.clone());
            inner.emit(raw, stored.clone());
            (stored, inner.ack_delay)
        };

        maybe_sleep(ack_delay).await;
        Ok(stored)
    }

    async fn history(&self, key: &ConversationKey) -> Result<Vec<Message>, BackendError> {
        let delay = self.inner.lock().unwrap().history_delay;
        maybe_sleep(delay).await;

        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_history.take() {
            return Err(BackendError::Unavailable(error));
        }

        let mut history: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| key.matches(&m.sender_id, &m.recipient_id))
            .cloned()
            .collect();
        history.sort_by_key(|m| m.created_at);
        Ok(history)
    }

    async fn mark_read(
        &self,
        sender: &UserId,
        recipient: &UserId,
        at: Timestamp,
    ) -> Result<u64, BackendError> {
        let delay = self.inner.lock().unwrap().mark_read_delay;
        maybe_sleep(delay).await;

        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_mark_read.take() {
            return Err(BackendError::Unavailable(error));
        }

        let mut updated = Vec::new();
        for message in inner.messages.iter_mut() {
            if &message.sender_id == sender && &message.recipient_id == recipient && message.is_unread() {
                message.read_at = Some(at);
                updated.push(message.clone());
            }
        }

        let count = updated.len() as u64;
        for message in updated {
            let raw = RawChange::updated(&message)?;
            inner.emit(raw, message);
        }
        Ok(count)
    }

    async fn delete(&self, id: &MessageId) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_delete.take() {
            return Err(BackendError::Rejected(error));
        }

        let before = inner.messages.len();
        inner.messages.retain(|m| &m.id != id);
        if inner.messages.len() == before {
            return Err(BackendError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn unread_by_sender(&self, recipient: &UserId) -> Result<UnreadSnapshot, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_unread.take() {
            return Err(BackendError::Unavailable(error));
        }

        let mut counts = HashMap::new();
        for message in &inner.messages {
            if &message.recipient_id == recipient && message.is_unread() {
                *counts.entry(message.sender_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(UnreadSnapshot {
            counts,
            as_of: Timestamp::from_millis(inner.clock),
        })
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, filter: ChangeFilter) -> Result<FeedSubscription, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_subscribe.take() {
            return Err(BackendError::Unavailable(error));
        }

        let id = inner.subscription_id();
        let (tx, events) = mpsc::unbounded_channel();
        inner.feeds.insert(id, Feed { filter, tx });
        Ok(FeedSubscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        inner
            .feeds
            .remove(&id)
            .map(|_| ())
            .ok_or(BackendError::UnknownSubscription(id))
    }
}

#[async_trait]
impl Realtime for MemoryBackend {
    async fn join(&self, channel: &str) -> Result<ChannelSubscription, BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_join.take() {
            return Err(BackendError::Unavailable(error));
        }

        let id = inner.subscription_id();
        let (tx, events) = mpsc::unbounded_channel();
        // New members start from the current snapshot
        let _ = tx.send(ChannelEvent::Sync {
            members: inner.snapshot(channel),
        });
        inner.members.insert(
            id,
            Member {
                channel: channel.to_string(),
                tx,
                presence: None,
            },
        );
        Ok(ChannelSubscription {
            id,
            channel: channel.to_string(),
            events,
        })
    }

    async fn track(&self, id: SubscriptionId, meta: PresenceMeta) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_track.take() {
            return Err(BackendError::Rejected(error));
        }

        let member = inner.member_mut(id)?;
        member.presence = Some(meta);
        let channel = member.channel.clone();
        inner.sync(&channel);
        Ok(())
    }

    async fn untrack(&self, id: SubscriptionId) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        let member = inner.member_mut(id)?;
        member.presence = None;
        let channel = member.channel.clone();
        inner.sync(&channel);
        Ok(())
    }

    async fn broadcast(&self, id: SubscriptionId, payload: Broadcast) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        let channel = inner.member_mut(id)?.channel.clone();
        for (other, member) in inner.members.iter() {
            if *other != id && member.channel == channel {
                let _ = member.tx.send(ChannelEvent::Broadcast(payload.clone()));
            }
        }
        inner.broadcasts.push((channel, payload));
        Ok(())
    }

    async fn leave(&self, id: SubscriptionId) -> Result<(), BackendError> {
        let mut inner = self.inner.lock().unwrap();

        let member = inner
            .members
            .remove(&id)
            .ok_or(BackendError::UnknownSubscription(id))?;
        if member.presence.is_some() {
            inner.sync(&member.channel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_types::{ChangeEvent, Profile};

    fn alice() -> UserId {
        UserId::from("alice")
    }

    fn bob() -> UserId {
        UserId::from("bob")
    }

    fn new_message(from: UserId, to: UserId, content: &str) -> NewMessage {
        NewMessage {
            sender_id: from,
            recipient_id: to,
            content: content.into(),
            attachment: None,
        }
    }

    fn meta(user: &str) -> PresenceMeta {
        PresenceMeta {
            user_id: UserId::from(user),
            online_at: Timestamp::from_millis(1),
        }
    }

    // ===========================================
    // Directory Tests
    // ===========================================

    #[tokio::test]
    async fn directory_returns_only_accepted_connections_of_user() {
        let backend = MemoryBackend::new();
        backend.add_connection(Connection::accepted(
            Profile::new("alice", "Alice"),
            Profile::new("bob", "Bob"),
        ));
        let mut pending =
            Connection::accepted(Profile::new("carol", "Carol"), Profile::new("alice", "Alice"));
        pending.status = ConnectionStatus::Pending;
        backend.add_connection(pending);
        backend.add_connection(Connection::accepted(
            Profile::new("x", "X"),
            Profile::new("y", "Y"),
        ));

        let connections = backend.accepted_connections(&alice()).await.unwrap();
        assert_eq!(connections.len(), 1);
    }

    #[tokio::test]
    async fn forced_directory_failure() {
        let backend = MemoryBackend::new();
        backend.fail_next_directory("offline");

        let result = backend.accepted_connections(&alice()).await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert!(backend.accepted_connections(&alice()).await.is_ok());
    }

    // ===========================================
    // Message Store Tests
    // ===========================================

    #[tokio::test]
    async fn insert_assigns_id_and_increasing_timestamps() {
        let backend = MemoryBackend::new();
        let first = backend.insert(new_message(alice(), bob(), "a")).await.unwrap();
        let second = backend.insert(new_message(bob(), alice(), "b")).await.unwrap();

        assert!(!first.id.is_placeholder());
        assert!(second.created_at > first.created_at);
        assert_eq!(backend.messages().len(), 2);
    }

    #[tokio::test]
    async fn history_is_scoped_and_ordered() {
        let backend = MemoryBackend::new();
        backend.insert(new_message(alice(), bob(), "1")).await.unwrap();
        backend
            .insert(new_message(alice(), UserId::from("carol"), "x"))
            .await
            .unwrap();
        backend.insert(new_message(bob(), alice(), "2")).await.unwrap();

        let history = backend
            .history(&ConversationKey::new(&bob(), &alice()))
            .await
            .unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn mark_read_is_batched_and_idempotent() {
        let backend = MemoryBackend::new();
        backend.insert(new_message(bob(), alice(), "1")).await.unwrap();
        backend.insert(new_message(bob(), alice(), "2")).await.unwrap();
        backend.insert(new_message(alice(), bob(), "3")).await.unwrap();

        let at = Timestamp::from_millis(99);
        assert_eq!(backend.mark_read(&bob(), &alice(), at).await.unwrap(), 2);
        assert_eq!(backend.mark_read(&bob(), &alice(), at).await.unwrap(), 0);

        let unread = backend.unread_by_sender(&bob()).await.unwrap();
        assert_eq!(unread.counts.get(&alice()), Some(&1));
        assert!(backend.unread_by_sender(&alice()).await.unwrap().counts.is_empty());
    }

    #[tokio::test]
    async fn unread_snapshot_covers_latest_insert() {
        let backend = MemoryBackend::new();
        let last = backend.insert(new_message(bob(), alice(), "1")).await.unwrap();

        let snapshot = backend.unread_by_sender(&alice()).await.unwrap();
        assert_eq!(snapshot.as_of, last.created_at);

        let next = backend.insert(new_message(bob(), alice(), "2")).await.unwrap();
        assert!(next.created_at > snapshot.as_of);
    }

    #[tokio::test]
    async fn seeded_message_is_stored_silently() {
        let backend = MemoryBackend::new();
        let mut feed = backend
            .subscribe(ChangeFilter::Recipient(bob()))
            .await
            .unwrap();

        let seeded = Message {
            id: MessageId::new("m1"),
            sender_id: alice(),
            recipient_id: bob(),
            content: "old".into(),
            attachment: None,
            created_at: Timestamp::from_millis(5_000_000_000_000),
            read_at: None,
        };
        backend.seed_message(seeded.clone());

        assert_eq!(backend.message(&seeded.id), Some(seeded.clone()));
        assert!(feed.events.try_recv().is_err());

        // Later inserts still sort after the seeded one
        let next = backend.insert(new_message(alice(), bob(), "new")).await.unwrap();
        assert!(next.created_at > seeded.created_at);
    }

    #[tokio::test]
    async fn delete_removes_message() {
        let backend = MemoryBackend::new();
        let stored = backend.insert(new_message(alice(), bob(), "x")).await.unwrap();

        backend.delete(&stored.id).await.unwrap();
        assert!(backend.message(&stored.id).is_none());
        assert!(matches!(
            backend.delete(&stored.id).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn forced_insert_failure_stores_nothing() {
        let backend = MemoryBackend::new();
        backend.fail_next_insert("constraint");

        let result = backend.insert(new_message(alice(), bob(), "x")).await;
        assert!(matches!(result, Err(BackendError::Rejected(_))));
        assert!(backend.messages().is_empty());
    }

    // ===========================================
    // Change Feed Tests
    // ===========================================

    #[tokio::test]
    async fn feed_delivers_matching_changes() {
        let backend = MemoryBackend::new();
        let mut feed = backend
            .subscribe(ChangeFilter::Recipient(alice()))
            .await
            .unwrap();

        backend.insert(new_message(alice(), bob(), "out")).await.unwrap();
        let stored = backend.insert(new_message(bob(), alice(), "in")).await.unwrap();

        let raw = feed.events.try_recv().unwrap();
        assert_eq!(
            ChangeEvent::try_from(raw).unwrap(),
            ChangeEvent::Inserted(stored)
        );
        assert!(feed.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn mark_read_emits_updates() {
        let backend = MemoryBackend::new();
        backend.insert(new_message(bob(), alice(), "1")).await.unwrap();
        let mut feed = backend
            .subscribe(ChangeFilter::Pair(ConversationKey::new(&alice(), &bob())))
            .await
            .unwrap();

        backend
            .mark_read(&bob(), &alice(), Timestamp::from_millis(5))
            .await
            .unwrap();

        let event = ChangeEvent::try_from(feed.events.try_recv().unwrap()).unwrap();
        assert!(matches!(event, ChangeEvent::Updated(m) if m.read_at.is_some()));
    }

    #[tokio::test]
    async fn forced_subscribe_failure_opens_nothing() {
        let backend = MemoryBackend::new();
        backend.fail_next_subscribe("offline");

        let result = backend.subscribe(ChangeFilter::Recipient(alice())).await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert_eq!(backend.feed_count(), 0);
        assert!(backend.subscribe(ChangeFilter::Recipient(alice())).await.is_ok());
    }

    #[tokio::test]
    async fn held_changes_are_released_in_order() {
        let backend = MemoryBackend::new();
        let mut feed = backend
            .subscribe(ChangeFilter::Recipient(alice()))
            .await
            .unwrap();

        backend.hold_changes();
        backend.insert(new_message(bob(), alice(), "1")).await.unwrap();
        backend.insert(new_message(bob(), alice(), "2")).await.unwrap();
        assert!(feed.events.try_recv().is_err());

        assert_eq!(backend.release_changes(), 2);
        let first = ChangeEvent::try_from(feed.events.try_recv().unwrap()).unwrap();
        let second = ChangeEvent::try_from(feed.events.try_recv().unwrap()).unwrap();
        assert_eq!(first.message().content, "1");
        assert_eq!(second.message().content, "2");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let backend = MemoryBackend::new();
        let feed = backend
            .subscribe(ChangeFilter::Recipient(alice()))
            .await
            .unwrap();
        assert_eq!(backend.feed_count(), 1);

        backend.unsubscribe(feed.id).await.unwrap();
        assert_eq!(backend.feed_count(), 0);
        assert!(matches!(
            backend.unsubscribe(feed.id).await,
            Err(BackendError::UnknownSubscription(_))
        ));
    }

    // ===========================================
    // Realtime Tests
    // ===========================================

    #[tokio::test]
    async fn track_sends_full_snapshot_to_every_member() {
        let backend = MemoryBackend::new();
        let mut a = backend.join("online").await.unwrap();
        let b = backend.join("online").await.unwrap();

        backend.track(a.id, meta("alice")).await.unwrap();
        backend.track(b.id, meta("bob")).await.unwrap();

        // initial sync, then one per track
        let mut last = None;
        while let Ok(event) = a.events.try_recv() {
            last = Some(event);
        }
        match last {
            Some(ChannelEvent::Sync { members }) => assert_eq!(members.len(), 2),
            other => panic!("Expected Sync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn leave_removes_presence() {
        let backend = MemoryBackend::new();
        let a = backend.join("online").await.unwrap();
        backend.track(a.id, meta("alice")).await.unwrap();
        assert_eq!(backend.presence("online").len(), 1);

        backend.leave(a.id).await.unwrap();
        assert!(backend.presence("online").is_empty());
        assert_eq!(backend.channel_members("online"), 0);
    }

    #[tokio::test]
    async fn broadcast_skips_sender_and_other_channels() {
        let backend = MemoryBackend::new();
        let mut a = backend.join("typing:a:b").await.unwrap();
        let mut b = backend.join("typing:a:b").await.unwrap();
        let mut c = backend.join("typing:a:c").await.unwrap();
        // drain initial syncs
        for sub in [&mut a, &mut b, &mut c] {
            while sub.events.try_recv().is_ok() {}
        }

        let payload = Broadcast::Typing { user_id: alice() };
        backend.broadcast(a.id, payload.clone()).await.unwrap();

        assert!(a.events.try_recv().is_err());
        assert_eq!(b.events.try_recv().unwrap(), ChannelEvent::Broadcast(payload.clone()));
        assert!(c.events.try_recv().is_err());
        assert_eq!(backend.broadcasts("typing:a:b"), vec![payload]);
    }

    #[tokio::test]
    async fn unknown_membership_is_rejected() {
        let backend = MemoryBackend::new();
        let result = backend.track(SubscriptionId::new(42), meta("alice")).await;
        assert!(matches!(result, Err(BackendError::UnknownSubscription(_))));
    }
}
