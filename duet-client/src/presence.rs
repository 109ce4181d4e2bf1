//! Presence tracking on the shared presence channel.
//!
//! The tracker joins the channel, registers the local user and rebuilds the
//! [`OnlineSet`] from every sync snapshot it receives.

use std::sync::Arc;

use duet_core::OnlineSet;
use duet_types::{ChannelEvent, PresenceMeta, Timestamp, UserId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{BackendError, Realtime, SubscriptionId};

/// Presence registration and online-set observer for one session.
#[derive(Debug)]
pub struct PresenceTracker<B: Realtime + Clone + 'static> {
    backend: B,
    channel: String,
    membership: Option<SubscriptionId>,
    online: Arc<watch::Sender<OnlineSet>>,
    pump: JoinHandle<()>,
}

impl<B: Realtime + Clone + 'static> PresenceTracker<B> {
    /// Join `channel` and register `me` as online.
    pub async fn start(backend: B, channel: &str, me: &UserId) -> Result<Self, BackendError> {
        let subscription = backend.join(channel).await?;
        let membership = subscription.id;

        let online = Arc::new(watch::Sender::new(OnlineSet::new()));
        let pump = tokio::spawn(run_presence_pump(subscription.events, Arc::clone(&online)));

        let meta = PresenceMeta {
            user_id: me.clone(),
            online_at: Timestamp::now(),
        };
        if let Err(e) = backend.track(membership, meta).await {
            pump.abort();
            if let Err(leave) = backend.leave(membership).await {
                warn!(channel, "Failed to leave presence channel: {}", leave);
            }
            return Err(e);
        }

        debug!(channel, user = %me, "Presence tracked");
        Ok(Self {
            backend,
            channel: channel.to_string(),
            membership: Some(membership),
            online,
            pump,
        })
    }

    /// Observe the online set.
    pub fn online(&self) -> watch::Receiver<OnlineSet> {
        self.online.subscribe()
    }

    /// Whether `user` is currently online.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.borrow().is_online(user)
    }

    /// Untrack, leave the channel and forget the online set.
    pub async fn stop(&mut self) {
        let Some(membership) = self.membership.take() else {
            return;
        };

        self.pump.abort();
        if let Err(e) = self.backend.untrack(membership).await {
            warn!(channel = %self.channel, "Failed to untrack presence: {}", e);
        }
        if let Err(e) = self.backend.leave(membership).await {
            warn!(channel = %self.channel, "Failed to leave presence channel: {}", e);
        }
        self.online.send_modify(|set| set.clear());
    }
}

impl<B: Realtime + Clone + 'static> Drop for PresenceTracker<B> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn run_presence_pump(
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    online: Arc<watch::Sender<OnlineSet>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Sync { members } => {
                online.send_modify(|set| set.replace(&members));
                debug!(members = members.len(), "Presence sync");
            }
            ChannelEvent::Broadcast(_) => {}
        }
    }
}
