//! Per-conversation message log with optimistic send reconciliation.
//!
//! The log is the visible history of one direct conversation. It is fed from
//! three directions:
//! - the initial history fetch ([`MessageLog::load`])
//! - local sends, which append a placeholder immediately
//!   ([`MessageLog::push_placeholder`])
//! - change events and insert acknowledgements from the store
//!   ([`MessageLog::apply_insert`], [`MessageLog::apply_update`],
//!   [`MessageLog::confirm`])
//!
//! Invariant: at most one visible entry exists per logical message. A
//! placeholder is replaced in place by its confirmed counterpart and is never
//! shown alongside it.

use duet_types::{Attachment, ConversationKey, Message, MessageId, NewMessage, Timestamp, UserId};

/// Delivery state of a log entry, from the local user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Placeholder shown before the store confirmed the insert.
    Sending,
    /// Confirmed by the store (includes every received message).
    Sent,
    /// The insert failed; the placeholder stays visible until retried.
    Failed,
}

/// A visible message plus its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The message as currently known.
    pub message: Message,
    /// Delivery state.
    pub delivery: Delivery,
}

impl LogEntry {
    fn sent(message: Message) -> Self {
        Self {
            message,
            delivery: Delivery::Sent,
        }
    }
}

/// Result of applying a confirmed insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The message was already present; nothing changed.
    Duplicate,
    /// A placeholder at `index` was replaced in place.
    Reconciled {
        /// Position of the replaced entry.
        index: usize,
    },
    /// The message was appended at `index`.
    Appended {
        /// Position of the new entry.
        index: usize,
    },
    /// The message does not belong to this conversation.
    Ignored,
}

impl InsertOutcome {
    /// Whether the visible log changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Reconciled { .. } | Self::Appended { .. })
    }
}

/// Generator of locally unique placeholder ids.
///
/// Ids have the form `temp-<millis>`. When a placeholder was already issued
/// for the same or a later millisecond the value is bumped past it.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderIds {
    last: u64,
}

impl PlaceholderIds {
    /// Create a generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the id for a send at `now`.
    pub fn next(&mut self, now: Timestamp) -> MessageId {
        let millis = now.millis().max(self.last.saturating_add(1));
        self.last = millis;
        MessageId::placeholder(Timestamp::from_millis(millis))
    }
}

/// Ordered message history between the local user and one partner.
#[derive(Debug, Clone)]
pub struct MessageLog {
    me: UserId,
    partner: UserId,
    key: ConversationKey,
    entries: Vec<LogEntry>,
}

impl MessageLog {
    /// Create an empty log for the conversation between `me` and `partner`.
    pub fn new(me: UserId, partner: UserId) -> Self {
        let key = ConversationKey::new(&me, &partner);
        Self {
            me,
            partner,
            key,
            entries: Vec::new(),
        }
    }

    /// The local user.
    pub fn me(&self) -> &UserId {
        &self.me
    }

    /// The conversation partner.
    pub fn partner(&self) -> &UserId {
        &self.partner
    }

    /// The conversation key for this pair.
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Load fetched history.
    ///
    /// History is ordered ascending by creation time. Entries that are already
    /// visible but absent from the history (placeholders, or events applied
    /// while the fetch was in flight) are kept after it in their current order.
    /// Messages outside this conversation are dropped.
    pub fn load(&mut self, mut history: Vec<Message>) {
        history.retain(|m| self.key.matches(&m.sender_id, &m.recipient_id));
        history.sort_by_key(|m| m.created_at);
        history.dedup_by(|a, b| a.id == b.id);

        let mut entries: Vec<LogEntry> = history.into_iter().map(LogEntry::sent).collect();
        for entry in self.entries.drain(..) {
            if !entries.iter().any(|e| e.message.id == entry.message.id) {
                entries.push(entry);
            }
        }
        self.entries = entries;
    }

    /// Build the placeholder for a local send.
    ///
    /// The message is not visible until [`MessageLog::push_placeholder`].
    pub fn placeholder(
        &self,
        id: MessageId,
        content: &str,
        attachment: Option<Attachment>,
        now: Timestamp,
    ) -> Message {
        Message {
            id,
            sender_id: self.me.clone(),
            recipient_id: self.partner.clone(),
            content: content.to_string(),
            attachment,
            created_at: now,
            read_at: None,
        }
    }

    /// Append a placeholder at the end of the log, before any confirmation.
    pub fn push_placeholder(&mut self, message: Message) {
        self.entries.push(LogEntry {
            message,
            delivery: Delivery::Sending,
        });
    }

    /// Apply a confirmed insert from the change feed.
    ///
    /// 1. Already present by id: discard.
    /// 2. Sent by me: replace the first placeholder still in flight with
    ///    identical content, keeping its position. Failed placeholders never
    ///    match; their send did not reach the store.
    /// 3. Otherwise append.
    ///
    /// Two identical sends that are both unconfirmed cannot be told apart;
    /// the first matching placeholder is taken and the other one stands in
    /// for the remaining send.
    pub fn apply_insert(&mut self, message: Message) -> InsertOutcome {
        if !self.key.matches(&message.sender_id, &message.recipient_id) {
            return InsertOutcome::Ignored;
        }
        if self.contains(&message.id) {
            return InsertOutcome::Duplicate;
        }

        if message.is_from(&self.me) {
            let slot = self.in_flight_match(&message.content, message.attachment.as_ref());
            if let Some(index) = slot {
                self.entries[index] = LogEntry::sent(message);
                return InsertOutcome::Reconciled { index };
            }
        }

        self.entries.push(LogEntry::sent(message));
        InsertOutcome::Appended {
            index: self.entries.len() - 1,
        }
    }

    /// Apply the store's acknowledgement of the insert issued for `placeholder`.
    ///
    /// If the echo event already consumed a placeholder for this message the
    /// acknowledgement is a no-op: when that was another identical
    /// placeholder, `placeholder` now stands in for that other send and is
    /// resolved by its acknowledgement or failure. Otherwise the named
    /// placeholder is replaced in place while it is still in flight; if it is
    /// gone, the content-match rule of [`MessageLog::apply_insert`] is used.
    pub fn confirm(&mut self, placeholder: &MessageId, message: Message) -> InsertOutcome {
        if !self.key.matches(&message.sender_id, &message.recipient_id) {
            return InsertOutcome::Ignored;
        }
        if self.contains(&message.id) {
            return InsertOutcome::Duplicate;
        }
        let named = self
            .position(placeholder)
            .filter(|&index| self.entries[index].delivery == Delivery::Sending);
        match named {
            Some(index) => {
                self.entries[index] = LogEntry::sent(message);
                InsertOutcome::Reconciled { index }
            }
            None => self.apply_insert(message),
        }
    }

    /// Apply an update event (read receipts).
    ///
    /// The stored message is replaced wholesale. Returns `false` when the id is
    /// not loaded, in which case the event is ignored.
    pub fn apply_update(&mut self, message: Message) -> bool {
        match self.position(&message.id) {
            Some(index) => {
                self.entries[index].message = message;
                true
            }
            None => false,
        }
    }

    /// Flag the placeholder of a send whose insert failed.
    ///
    /// If an echo of an identical send already took `placeholder`, the
    /// in-flight placeholder with the same content that stands in for it is
    /// flagged instead, so the failure stays visible and retryable.
    pub fn mark_failed(&mut self, placeholder: &MessageId, sent: &NewMessage) -> bool {
        let index = match self.position(placeholder) {
            Some(index) => Some(index).filter(|&i| self.entries[i].delivery == Delivery::Sending),
            None => self.in_flight_match(&sent.content, sent.attachment.as_ref()),
        };
        match index {
            Some(index) => {
                self.entries[index].delivery = Delivery::Failed;
                true
            }
            None => false,
        }
    }

    /// Move a failed placeholder back to sending and return it for re-insert.
    pub fn mark_retrying(&mut self, id: &MessageId) -> Option<Message> {
        match self.entry_mut(id) {
            Some(entry) if entry.delivery == Delivery::Failed => {
                entry.delivery = Delivery::Sending;
                Some(entry.message.clone())
            }
            _ => None,
        }
    }

    /// Remove a message by id.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.position(id)?;
        Some(self.entries.remove(index).message)
    }

    /// Whether a message with `id` is visible.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    /// Look up a visible entry by id.
    pub fn get(&self, id: &MessageId) -> Option<&LogEntry> {
        self.entries.iter().find(|e| &e.message.id == id)
    }

    /// All visible entries in display order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Visible messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|e| &e.message.id == id)
    }

    /// First in-flight placeholder with this content and attachment.
    fn in_flight_match(&self, content: &str, attachment: Option<&Attachment>) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.delivery == Delivery::Sending
                && e.message.is_placeholder()
                && e.message.content == content
                && e.message.attachment.as_ref() == attachment
        })
    }

    fn entry_mut(&mut self, id: &MessageId) -> Option<&mut LogEntry> {
        self.entries.iter_mut().find(|e| &e.message.id == id)
    }
}
