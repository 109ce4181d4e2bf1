//! Session engine.
//!
//! A [`Session`] is the single owner of every piece of per-user state: the
//! presence registration, the unread counters and at most one open
//! [`Conversation`]. It is constructed by [`Session::start`] and torn down by
//! [`Session::shutdown`].
//!
//! Public operations never fail on the render path. Store and channel
//! failures are logged and leave the session in a degraded but usable state.

use duet_core::{resolve_partners, MessageLog, OnlineSet, UnreadCounts};
use duet_types::{Attachment, MessageId, Profile, UserId};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::backend::{Backend, BackendError};
use crate::config::EngineConfig;
use crate::conversation::Conversation;
use crate::presence::PresenceTracker;
use crate::unread::UnreadListener;

/// One signed-in user's view of the messaging system.
#[derive(Debug)]
pub struct Session<B: Backend> {
    config: EngineConfig,
    backend: B,
    me: UserId,
    presence: Option<PresenceTracker<B>>,
    unread: UnreadListener<B>,
    conversation: Option<Conversation<B>>,
}

impl<B: Backend> Session<B> {
    /// Start a session for `me`.
    ///
    /// Joins presence (degrades to "nobody online" on failure), subscribes to
    /// inserts addressed to `me` and seeds the unread counters.
    ///
    /// # Errors
    ///
    /// Returns an error only if the unread subscription cannot be opened.
    pub async fn start(config: EngineConfig, backend: B, me: UserId) -> Result<Self, BackendError> {
        let presence =
            match PresenceTracker::start(backend.clone(), &config.presence.channel, &me).await {
                Ok(tracker) => Some(tracker),
                Err(e) => {
                    warn!(user = %me, "Presence unavailable: {}", e);
                    None
                }
            };

        let unread =
            UnreadListener::start(backend.clone(), me.clone(), config.unread.seed_from_store)
                .await?;

        info!(user = %me, "Session started");
        Ok(Self {
            config,
            backend,
            me,
            presence,
            unread,
            conversation: None,
        })
    }

    /// The signed-in user.
    pub fn me(&self) -> &UserId {
        &self.me
    }

    /// Accepted conversation partners.
    ///
    /// A directory failure is logged and yields an empty list.
    pub async fn partners(&self) -> Vec<Profile> {
        match self.backend.accepted_connections(&self.me).await {
            Ok(connections) => resolve_partners(&self.me, &connections),
            Err(e) => {
                error!(user = %self.me, "Failed to fetch connections: {}", e);
                Vec::new()
            }
        }
    }

    /// Observe the online set.
    pub fn online(&self) -> watch::Receiver<OnlineSet> {
        match &self.presence {
            Some(presence) => presence.online(),
            None => watch::channel(OnlineSet::new()).1,
        }
    }

    /// Whether `user` is online.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.presence.as_ref().is_some_and(|p| p.is_online(user))
    }

    /// Observe the unread counters.
    pub fn unread(&self) -> watch::Receiver<UnreadCounts> {
        self.unread.counts()
    }

    /// Make `partner` the active conversation.
    ///
    /// Closes the previous conversation first and clears `partner`'s unread
    /// count before any store call. Returns whether the conversation opened.
    pub async fn open_conversation(&mut self, partner: UserId) -> bool {
        self.close_conversation().await;
        self.unread.activate(&partner);

        match Conversation::open(
            self.backend.clone(),
            self.me.clone(),
            partner.clone(),
            &self.config.typing,
        )
        .await
        {
            Ok(conversation) => {
                info!(partner = %partner, "Conversation opened");
                self.conversation = Some(conversation);
                true
            }
            Err(e) => {
                error!(partner = %partner, "Failed to open conversation: {}", e);
                self.unread.deactivate();
                false
            }
        }
    }

    /// Close the active conversation, if any.
    pub async fn close_conversation(&mut self) {
        if let Some(mut conversation) = self.conversation.take() {
            conversation.close().await;
        }
        self.unread.deactivate();
    }

    /// The active conversation.
    pub fn conversation(&self) -> Option<&Conversation<B>> {
        self.conversation.as_ref()
    }

    /// The active partner.
    pub fn active_partner(&self) -> Option<&UserId> {
        self.conversation.as_ref().map(|c| c.partner())
    }

    /// Observe the active conversation's log.
    pub fn log(&self) -> Option<watch::Receiver<MessageLog>> {
        self.conversation.as_ref().map(|c| c.log())
    }

    /// Send to the active partner; returns the placeholder id.
    pub fn send(&mut self, content: &str, attachment: Option<Attachment>) -> Option<MessageId> {
        match self.conversation.as_mut() {
            Some(conversation) => Some(conversation.send(content, attachment)),
            None => {
                warn!("Send without an active conversation");
                None
            }
        }
    }

    /// Retry a failed send in the active conversation.
    pub fn retry(&mut self, id: &MessageId) -> bool {
        self.conversation
            .as_mut()
            .is_some_and(|conversation| conversation.retry(id))
    }

    /// Delete a message from the active conversation.
    pub async fn delete(&mut self, id: &MessageId) {
        if let Some(conversation) = self.conversation.as_mut() {
            conversation.delete(id).await;
        }
    }

    /// Register a keystroke in the active conversation.
    pub async fn keystroke(&mut self) -> bool {
        match self.conversation.as_mut() {
            Some(conversation) => conversation.keystroke().await,
            None => false,
        }
    }

    /// Whether the active partner is typing.
    pub fn typing_visible(&self) -> watch::Receiver<bool> {
        match &self.conversation {
            Some(conversation) => conversation.typing_visible(),
            None => watch::channel(false).1,
        }
    }

    /// Tear everything down.
    pub async fn shutdown(&mut self) {
        self.close_conversation().await;
        self.unread.stop().await;
        if let Some(presence) = self.presence.as_mut() {
            presence.stop().await;
        }
        info!(user = %self.me, "Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MessageStore};
    use duet_types::{Connection, NewMessage};
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn start(backend: &MemoryBackend, me: &str) -> Session<MemoryBackend> {
        Session::start(EngineConfig::default(), backend.clone(), user(me))
            .await
            .unwrap()
    }

    async fn deliver(backend: &MemoryBackend, from: &str, to: &str, content: &str) {
        backend
            .insert(NewMessage {
                sender_id: user(from),
                recipient_id: user(to),
                content: content.into(),
                attachment: None,
            })
            .await
            .unwrap();
    }

    // ===========================================
    // Directory Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn partners_from_directory() {
        let backend = MemoryBackend::new();
        backend.add_connection(Connection::accepted(
            Profile::new("alice", "Alice"),
            Profile::new("bob", "Bob"),
        ));
        backend.add_connection(Connection::accepted(
            Profile::new("carol", "Carol"),
            Profile::new("alice", "Alice"),
        ));
        let session = start(&backend, "alice").await;

        let ids: Vec<_> = session.partners().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![user("bob"), user("carol")]);
    }

    #[tokio::test(start_paused = true)]
    async fn directory_failure_yields_empty_list() {
        let backend = MemoryBackend::new();
        backend.add_connection(Connection::accepted(
            Profile::new("alice", "Alice"),
            Profile::new("bob", "Bob"),
        ));
        let session = start(&backend, "alice").await;
        backend.fail_next_directory("offline");

        assert!(session.partners().await.is_empty());
    }

    // ===========================================
    // Lifecycle Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn start_seeds_unread_from_store() {
        let backend = MemoryBackend::new();
        deliver(&backend, "bob", "alice", "1").await;
        deliver(&backend, "bob", "alice", "2").await;

        let session = start(&backend, "alice").await;
        assert_eq!(session.unread().borrow().get(&user("bob")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn seeding_can_be_disabled() {
        let backend = MemoryBackend::new();
        deliver(&backend, "bob", "alice", "1").await;

        let mut config = EngineConfig::default();
        config.unread.seed_from_store = false;
        let session = Session::start(config, backend.clone(), user("alice"))
            .await
            .unwrap();

        assert_eq!(session.unread().borrow().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn presence_failure_degrades() {
        let backend = MemoryBackend::new();
        backend.fail_next_join("offline");

        let session = start(&backend, "alice").await;
        assert!(session.online().borrow().is_empty());
        assert!(!session.is_online(&user("alice")));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_partner_closes_previous_conversation() {
        let backend = MemoryBackend::new();
        let mut session = start(&backend, "alice").await;

        assert!(session.open_conversation(user("bob")).await);
        assert!(session.open_conversation(user("carol")).await);

        // unread feed plus the carol pair feed
        assert_eq!(backend.feed_count(), 2);
        assert_eq!(backend.channel_members("typing:alice:bob"), 0);
        assert_eq!(session.active_partner(), Some(&user("carol")));
    }

    #[tokio::test(start_paused = true)]
    async fn mark_read_failure_keeps_local_count_cleared() {
        let backend = MemoryBackend::new();
        deliver(&backend, "bob", "alice", "1").await;
        deliver(&backend, "bob", "alice", "2").await;
        let mut session = start(&backend, "alice").await;
        assert_eq!(session.unread().borrow().get(&user("bob")), 2);

        backend.fail_next_mark_read("timeout");
        assert!(session.open_conversation(user("bob")).await);
        settle().await;

        assert_eq!(session.unread().borrow().get(&user("bob")), 0);
        assert!(backend.messages().iter().all(|m| m.read_at.is_none()));
        assert_eq!(session.log().unwrap().borrow().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_releases_typing_and_resumes_counting() {
        let backend = MemoryBackend::new();
        let mut session = start(&backend, "alice").await;

        backend.fail_next_subscribe("offline");
        assert!(!session.open_conversation(user("bob")).await);

        assert!(session.active_partner().is_none());
        assert_eq!(backend.channel_members("typing:alice:bob"), 0);
        assert_eq!(backend.feed_count(), 1);

        deliver(&backend, "bob", "alice", "missed").await;
        settle().await;
        assert_eq!(session.unread().borrow().get(&user("bob")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_without_conversation_is_noop() {
        let backend = MemoryBackend::new();
        let mut session = start(&backend, "alice").await;

        assert!(session.send("lost", None).is_none());
        assert!(!session.keystroke().await);
        assert!(backend.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_everything() {
        let backend = MemoryBackend::new();
        let mut session = start(&backend, "alice").await;
        session.open_conversation(user("bob")).await;
        settle().await;

        session.shutdown().await;

        assert_eq!(backend.feed_count(), 0);
        assert_eq!(backend.channel_members("online-users"), 0);
        assert_eq!(backend.channel_members("typing:alice:bob"), 0);
        assert!(session.conversation().is_none());
    }
}
