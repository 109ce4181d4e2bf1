//! Typing signal for the active conversation.
//!
//! Outgoing keystrokes are throttled and broadcast on the conversation's
//! typing channel. Incoming signals from the partner drive a visibility flag
//! with a single hide deadline.

use std::sync::Arc;

use duet_core::{TypingIndicator, TypingThrottle};
use duet_types::{Broadcast, ChannelEvent, ConversationKey, UserId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{BackendError, Realtime, SubscriptionId};
use crate::config::TypingConfig;

/// Handle that hides the partner's typing indicator immediately.
#[derive(Debug, Clone)]
pub struct TypingClear {
    tx: mpsc::UnboundedSender<()>,
}

impl TypingClear {
    /// Hide the indicator (no-op when already hidden or closed).
    pub fn clear(&self) {
        let _ = self.tx.send(());
    }
}

/// Membership of one conversation's typing channel.
#[derive(Debug)]
pub struct TypingSignal<B: Realtime + Clone + 'static> {
    backend: B,
    me: UserId,
    channel: String,
    membership: Option<SubscriptionId>,
    throttle: TypingThrottle,
    visible: Arc<watch::Sender<bool>>,
    clear: TypingClear,
    watcher: JoinHandle<()>,
}

impl<B: Realtime + Clone + 'static> TypingSignal<B> {
    /// Join the typing channel of `key` as `me`, watching for `partner`.
    pub async fn join(
        backend: B,
        key: &ConversationKey,
        me: UserId,
        partner: UserId,
        config: &TypingConfig,
    ) -> Result<Self, BackendError> {
        let channel = key.typing_channel(&config.channel_prefix);
        let subscription = backend.join(&channel).await?;

        let visible = Arc::new(watch::Sender::new(false));
        let (clear_tx, clear_rx) = mpsc::unbounded_channel();
        let indicator = TypingIndicator::new(partner, config.expiry());
        let watcher = tokio::spawn(run_typing_watch(
            subscription.events,
            clear_rx,
            indicator,
            Arc::clone(&visible),
        ));

        debug!(channel = %channel, "Joined typing channel");
        Ok(Self {
            backend,
            me,
            channel,
            membership: Some(subscription.id),
            throttle: TypingThrottle::new(config.throttle()),
            visible,
            clear: TypingClear { tx: clear_tx },
            watcher,
        })
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Register a local keystroke; broadcasts unless throttled.
    ///
    /// Returns whether a signal was sent.
    pub async fn keystroke(&mut self) -> bool {
        let Some(membership) = self.membership else {
            return false;
        };
        if !self.throttle.try_fire(Instant::now().into_std()) {
            return false;
        }

        let payload = Broadcast::Typing {
            user_id: self.me.clone(),
        };
        match self.backend.broadcast(membership, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %self.channel, "Typing broadcast failed: {}", e);
                false
            }
        }
    }

    /// Observe whether the partner is typing.
    pub fn visible(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    /// Hide the partner's indicator now.
    pub fn clear(&self) {
        self.clear.clear();
    }

    /// Handle for hiding the indicator from another task.
    pub fn clear_handle(&self) -> TypingClear {
        self.clear.clone()
    }

    /// Leave the channel and discard any pending hide deadline.
    pub async fn close(&mut self) {
        let Some(membership) = self.membership.take() else {
            return;
        };

        self.watcher.abort();
        self.visible.send_replace(false);
        if let Err(e) = self.backend.leave(membership).await {
            warn!(channel = %self.channel, "Failed to leave typing channel: {}", e);
        }
    }
}

impl<B: Realtime + Clone + 'static> Drop for TypingSignal<B> {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn wait_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn run_typing_watch(
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    mut clear: mpsc::UnboundedReceiver<()>,
    mut indicator: TypingIndicator,
    visible: Arc<watch::Sender<bool>>,
) {
    loop {
        let deadline = indicator.deadline();
        tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Broadcast(payload)) => {
                    if indicator.on_broadcast(&payload, Instant::now().into_std()) {
                        visible.send_if_modified(|v| !std::mem::replace(v, true));
                    }
                }
                Some(ChannelEvent::Sync { .. }) => {}
                None => break,
            },
            Some(()) = clear.recv() => {
                if indicator.clear() {
                    visible.send_if_modified(|v| std::mem::replace(v, false));
                }
            }
            _ = wait_until(deadline) => {
                if indicator.expire(Instant::now().into_std()) {
                    visible.send_if_modified(|v| std::mem::replace(v, false));
                }
            }
        }
    }
}
