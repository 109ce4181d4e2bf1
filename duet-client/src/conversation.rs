//! The active conversation.
//!
//! A [`Conversation`] owns everything scoped to one partner: the pair change
//! subscription, the [`MessageLog`] it feeds, the typing channel and the
//! read-receipt calls issued while it is open.
//!
//! # Lifecycle
//!
//! ```text
//! open:  join typing -> subscribe pair -> fetch history -> mark read
//! live:  pair events -> reconcile log (partner insert -> mark read, hide typing)
//! send:  placeholder -> insert -> confirm | fail
//! close: abort pump -> unsubscribe -> leave typing
//! ```

use std::sync::Arc;

use duet_core::{MessageLog, PlaceholderIds};
use duet_types::{
    Attachment, ChangeEvent, Message, MessageId, NewMessage, RawChange, Timestamp, UserId,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::backend::{Backend, BackendError, ChangeFilter, SubscriptionId};
use crate::config::TypingConfig;
use crate::typing::{TypingClear, TypingSignal};

/// Open conversation between the local user and one partner.
#[derive(Debug)]
pub struct Conversation<B: Backend> {
    backend: B,
    me: UserId,
    partner: UserId,
    log: Arc<watch::Sender<MessageLog>>,
    feed: Option<SubscriptionId>,
    pump: JoinHandle<()>,
    typing: Option<TypingSignal<B>>,
    placeholders: PlaceholderIds,
}

impl<B: Backend> Conversation<B> {
    /// Open the conversation between `me` and `partner`.
    ///
    /// A typing channel that cannot be joined or a history fetch that fails
    /// only degrade the conversation. Failing to subscribe to the pair is
    /// reported.
    pub async fn open(
        backend: B,
        me: UserId,
        partner: UserId,
        typing_config: &TypingConfig,
    ) -> Result<Self, BackendError> {
        let log = MessageLog::new(me.clone(), partner.clone());
        let key = log.key().clone();

        let typing = match TypingSignal::join(
            backend.clone(),
            &key,
            me.clone(),
            partner.clone(),
            typing_config,
        )
        .await
        {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!(partner = %partner, "Typing channel unavailable: {}", e);
                None
            }
        };

        // Subscribe before fetching so nothing committed during the fetch is lost
        let subscription = match backend.subscribe(ChangeFilter::Pair(key.clone())).await {
            Ok(subscription) => subscription,
            Err(e) => {
                if let Some(mut typing) = typing {
                    typing.close().await;
                }
                return Err(e);
            }
        };

        let log = Arc::new(watch::Sender::new(log));
        match backend.history(&key).await {
            Ok(history) => {
                debug!(partner = %partner, messages = history.len(), "History loaded");
                log.send_modify(|log| log.load(history));
            }
            Err(e) => error!(partner = %partner, "Failed to fetch history: {}", e),
        }

        let pump = tokio::spawn(run_conversation_pump(
            backend.clone(),
            subscription.events,
            Arc::clone(&log),
            typing.as_ref().map(|t| t.clear_handle()),
        ));

        spawn_mark_read(backend.clone(), partner.clone(), me.clone());

        Ok(Self {
            backend,
            me,
            partner,
            log,
            feed: Some(subscription.id),
            pump,
            typing,
            placeholders: PlaceholderIds::new(),
        })
    }

    /// The conversation partner.
    pub fn partner(&self) -> &UserId {
        &self.partner
    }

    /// Observe the message log.
    pub fn log(&self) -> watch::Receiver<MessageLog> {
        self.log.subscribe()
    }

    /// Observe whether the partner is typing.
    pub fn typing_visible(&self) -> watch::Receiver<bool> {
        match &self.typing {
            Some(typing) => typing.visible(),
            None => watch::channel(false).1,
        }
    }

    /// Send a message optimistically.
    ///
    /// The placeholder is visible before this returns; the insert completes in
    /// the background. Returns the placeholder id.
    pub fn send(&mut self, content: &str, attachment: Option<Attachment>) -> MessageId {
        let now = Timestamp::now();
        let id = self.placeholders.next(now);

        let mut placeholder = None;
        self.log.send_modify(|log| {
            let message = log.placeholder(id.clone(), content, attachment, now);
            placeholder = Some(NewMessage::from_placeholder(&message));
            log.push_placeholder(message);
        });

        if let Some(new) = placeholder {
            spawn_insert(self.backend.clone(), Arc::clone(&self.log), id.clone(), new);
        }
        id
    }

    /// Re-issue the insert for a failed placeholder.
    ///
    /// Returns false when `id` is not a failed placeholder.
    pub fn retry(&mut self, id: &MessageId) -> bool {
        let mut retried = None;
        self.log.send_if_modified(|log| {
            retried = log.mark_retrying(id);
            retried.is_some()
        });

        match retried {
            Some(message) => {
                debug!(id = %id, "Retrying send");
                spawn_insert(
                    self.backend.clone(),
                    Arc::clone(&self.log),
                    id.clone(),
                    NewMessage::from_placeholder(&message),
                );
                true
            }
            None => false,
        }
    }

    /// Remove a message locally and delete it from the store.
    pub async fn delete(&mut self, id: &MessageId) {
        self.log.send_if_modified(|log| log.remove(id).is_some());

        // Placeholders were never stored
        if id.is_placeholder() {
            return;
        }
        if let Err(e) = self.backend.delete(id).await {
            error!(id = %id, "Failed to delete message: {}", e);
        }
    }

    /// Register a local keystroke on the typing channel.
    pub async fn keystroke(&mut self) -> bool {
        match self.typing.as_mut() {
            Some(typing) => typing.keystroke().await,
            None => false,
        }
    }

    /// Tear down the pair subscription and the typing channel.
    pub async fn close(&mut self) {
        self.pump.abort();
        if let Some(feed) = self.feed.take() {
            if let Err(e) = self.backend.unsubscribe(feed).await {
                warn!(partner = %self.partner, "Failed to unsubscribe: {}", e);
            }
        }
        if let Some(typing) = self.typing.as_mut() {
            typing.close().await;
        }
        debug!(me = %self.me, partner = %self.partner, "Conversation closed");
    }
}

impl<B: Backend> Drop for Conversation<B> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn spawn_insert<B: Backend>(
    backend: B,
    log: Arc<watch::Sender<MessageLog>>,
    placeholder: MessageId,
    message: NewMessage,
) {
    tokio::spawn(async move {
        match backend.insert(message.clone()).await {
            Ok(stored) => {
                debug!(placeholder = %placeholder, id = %stored.id, "Send confirmed");
                log.send_if_modified(|log| log.confirm(&placeholder, stored).changed());
            }
            Err(e) => {
                error!(placeholder = %placeholder, "Failed to send message: {}", e);
                log.send_if_modified(|log| log.mark_failed(&placeholder, &message));
            }
        }
    });
}

fn spawn_mark_read<B: Backend>(backend: B, sender: UserId, recipient: UserId) {
    tokio::spawn(async move {
        match backend.mark_read(&sender, &recipient, Timestamp::now()).await {
            Ok(updated) => debug!(sender = %sender, updated, "Marked read"),
            Err(e) => warn!(sender = %sender, "Failed to mark messages read: {}", e),
        }
    });
}

async fn run_conversation_pump<B: Backend>(
    backend: B,
    mut events: mpsc::UnboundedReceiver<RawChange>,
    log: Arc<watch::Sender<MessageLog>>,
    typing: Option<TypingClear>,
) {
    while let Some(raw) = events.recv().await {
        let event = match ChangeEvent::try_from(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping invalid change payload: {}", e);
                continue;
            }
        };

        match event {
            ChangeEvent::Inserted(message) => apply_insert(&backend, &log, typing.as_ref(), message),
            ChangeEvent::Updated(message) => {
                log.send_if_modified(|log| log.apply_update(message));
            }
        }
    }
}

fn apply_insert<B: Backend>(
    backend: &B,
    log: &watch::Sender<MessageLog>,
    typing: Option<&TypingClear>,
    message: Message,
) {
    let (me, partner) = {
        let log = log.borrow();
        (log.me().clone(), log.partner().clone())
    };
    let from_partner = message.is_from(&partner);

    let mut outcome = None;
    log.send_if_modified(|log| {
        let result = log.apply_insert(message);
        outcome = Some(result);
        result.changed()
    });
    debug!(partner = %partner, outcome = ?outcome, "Insert applied");

    if from_partner && outcome.is_some_and(|o| o.changed()) {
        spawn_mark_read(backend.clone(), partner, me);
        if let Some(typing) = typing {
            typing.clear();
        }
    }
}
