//! Session-wide unread listener.
//!
//! One subscription to every insert addressed to the local user feeds the
//! [`UnreadCounts`]. Messages from the active partner are not counted.
//!
//! The store snapshot is taken after subscribing. Inserts the snapshot
//! already counts may still arrive on the feed; they are recognised by
//! creation time and skipped.

use std::sync::Arc;

use duet_core::UnreadCounts;
use duet_types::{ChangeEvent, RawChange, Timestamp, UserId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{BackendError, ChangeFeed, ChangeFilter, MessageStore, SubscriptionId};

/// Unread counters for one session.
#[derive(Debug)]
pub struct UnreadListener<B: ChangeFeed + MessageStore + Clone + 'static> {
    backend: B,
    feed: Option<SubscriptionId>,
    counts: Arc<watch::Sender<UnreadCounts>>,
    active: Arc<watch::Sender<Option<UserId>>>,
    pump: JoinHandle<()>,
}

impl<B: ChangeFeed + MessageStore + Clone + 'static> UnreadListener<B> {
    /// Subscribe to inserts addressed to `me`.
    ///
    /// With `seed_from_store` the counts start from the store's unread
    /// snapshot. A failed snapshot is logged and counting starts from zero.
    pub async fn start(
        backend: B,
        me: UserId,
        seed_from_store: bool,
    ) -> Result<Self, BackendError> {
        let subscription = backend
            .subscribe(ChangeFilter::Recipient(me.clone()))
            .await?;

        let mut counts = UnreadCounts::new();
        let mut cutoff = None;
        if seed_from_store {
            match backend.unread_by_sender(&me).await {
                Ok(snapshot) => {
                    debug!(user = %me, as_of = %snapshot.as_of, "Unread counts seeded");
                    counts.seed(snapshot.counts, None);
                    cutoff = Some(snapshot.as_of);
                }
                Err(e) => warn!(user = %me, "Failed to seed unread counts: {}", e),
            }
        }

        let counts = Arc::new(watch::Sender::new(counts));
        let active = Arc::new(watch::Sender::new(None));
        let pump = tokio::spawn(run_unread_pump(
            me,
            subscription.events,
            cutoff,
            Arc::clone(&counts),
            Arc::clone(&active),
        ));

        Ok(Self {
            backend,
            feed: Some(subscription.id),
            counts,
            active,
            pump,
        })
    }

    /// Observe the unread counts.
    pub fn counts(&self) -> watch::Receiver<UnreadCounts> {
        self.counts.subscribe()
    }

    /// Make `partner` the active conversation and clear its count.
    ///
    /// Runs synchronously, so the count is gone before any store call.
    pub fn activate(&self, partner: &UserId) {
        self.active.send_replace(Some(partner.clone()));
        self.counts.send_if_modified(|counts| counts.clear(partner) > 0);
    }

    /// No conversation is active any more.
    pub fn deactivate(&self) {
        self.active.send_replace(None);
    }

    /// Unsubscribe and reset the counts.
    pub async fn stop(&mut self) {
        self.pump.abort();
        if let Some(feed) = self.feed.take() {
            if let Err(e) = self.backend.unsubscribe(feed).await {
                warn!("Failed to unsubscribe unread feed: {}", e);
            }
        }
        self.counts.send_modify(|counts| counts.reset());
    }
}

impl<B: ChangeFeed + MessageStore + Clone + 'static> Drop for UnreadListener<B> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn run_unread_pump(
    me: UserId,
    mut events: mpsc::UnboundedReceiver<RawChange>,
    cutoff: Option<Timestamp>,
    counts: Arc<watch::Sender<UnreadCounts>>,
    active: Arc<watch::Sender<Option<UserId>>>,
) {
    while let Some(raw) = events.recv().await {
        let message = match ChangeEvent::try_from(raw) {
            Ok(ChangeEvent::Inserted(message)) => message,
            Ok(ChangeEvent::Updated(_)) => continue,
            Err(e) => {
                warn!("Dropping invalid change payload: {}", e);
                continue;
            }
        };

        // Already part of the seeded snapshot
        if cutoff.is_some_and(|as_of| message.created_at <= as_of) {
            continue;
        }

        let partner = active.borrow().clone();
        let counted =
            counts.send_if_modified(|counts| counts.record_insert(&me, partner.as_ref(), &message));
        if counted {
            debug!(sender = %message.sender_id, "Unread message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MessageStore};
    use duet_types::NewMessage;
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    async fn send(backend: &MemoryBackend, from: &str, to: &str) {
        backend
            .insert(NewMessage {
                sender_id: user(from),
                recipient_id: user(to),
                content: "x".into(),
                attachment: None,
            })
            .await
            .unwrap();
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn counts_messages_from_inactive_partners() {
        let backend = MemoryBackend::new();
        let listener = UnreadListener::start(backend.clone(), user("alice"), false).await.unwrap();
        listener.activate(&user("bob"));

        send(&backend, "bob", "alice").await;
        send(&backend, "carol", "alice").await;
        send(&backend, "carol", "alice").await;
        send(&backend, "alice", "carol").await;
        settle().await;

        let counts = listener.counts();
        let counts = counts.borrow();
        assert_eq!(counts.get(&user("bob")), 0);
        assert_eq!(counts.get(&user("carol")), 2);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_clears_count() {
        let backend = MemoryBackend::new();
        let listener = UnreadListener::start(backend.clone(), user("alice"), false).await.unwrap();
        send(&backend, "bob", "alice").await;
        settle().await;
        assert_eq!(listener.counts().borrow().get(&user("bob")), 1);

        listener.activate(&user("bob"));
        assert!(!listener.counts().borrow().contains(&user("bob")));
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_resumes_counting() {
        let backend = MemoryBackend::new();
        let listener = UnreadListener::start(backend.clone(), user("alice"), false).await.unwrap();
        listener.activate(&user("bob"));
        listener.deactivate();

        send(&backend, "bob", "alice").await;
        settle().await;
        assert_eq!(listener.counts().borrow().get(&user("bob")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_seeds_from_store() {
        let backend = MemoryBackend::new();
        send(&backend, "bob", "alice").await;
        send(&backend, "bob", "alice").await;
        send(&backend, "carol", "alice").await;
        send(&backend, "alice", "bob").await;

        let listener = UnreadListener::start(backend.clone(), user("alice"), true).await.unwrap();

        let counts = listener.counts();
        let counts = counts.borrow();
        assert_eq!(counts.get(&user("bob")), 2);
        assert_eq!(counts.get(&user("carol")), 1);
        assert_eq!(counts.total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_insert_is_not_counted_again_from_feed() {
        let backend = MemoryBackend::new();

        // Committed before the snapshot, delivered after it
        backend.hold_changes();
        send(&backend, "bob", "alice").await;
        let listener = UnreadListener::start(backend.clone(), user("alice"), true).await.unwrap();
        assert_eq!(listener.counts().borrow().get(&user("bob")), 1);

        assert_eq!(backend.release_changes(), 1);
        settle().await;
        assert_eq!(listener.counts().borrow().get(&user("bob")), 1);

        send(&backend, "bob", "alice").await;
        settle().await;
        assert_eq!(listener.counts().borrow().get(&user("bob")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_snapshot_counts_from_zero() {
        let backend = MemoryBackend::new();
        send(&backend, "bob", "alice").await;
        backend.fail_next_unread("timeout");

        let listener = UnreadListener::start(backend.clone(), user("alice"), true).await.unwrap();
        assert_eq!(listener.counts().borrow().total(), 0);

        send(&backend, "bob", "alice").await;
        settle().await;
        assert_eq!(listener.counts().borrow().get(&user("bob")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_unsubscribes() {
        let backend = MemoryBackend::new();
        let mut listener = UnreadListener::start(backend.clone(), user("alice"), false).await.unwrap();
        assert_eq!(backend.feed_count(), 1);

        listener.stop().await;
        assert_eq!(backend.feed_count(), 0);
        assert_eq!(listener.counts().borrow().total(), 0);
    }
}
