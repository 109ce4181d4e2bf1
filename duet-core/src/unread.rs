//! Per-partner unread counters.
//!
//! Counts messages received while their conversation was not active. The
//! counters are derived, ephemeral state: nothing here is persisted, and the
//! active partner's entry is always absent.

use std::collections::HashMap;

use duet_types::{Message, UserId};

/// Unread message counts keyed by sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounts {
    counts: HashMap<UserId, u32>,
}

impl UnreadCounts {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insert addressed to `me`.
    ///
    /// Increments the sender's count unless the sender is the active partner
    /// (that message is appended to the open log and read on arrival).
    /// Returns whether a count changed.
    pub fn record_insert(&mut self, me: &UserId, active: Option<&UserId>, message: &Message) -> bool {
        if &message.recipient_id != me || message.is_from(me) {
            return false;
        }
        if active == Some(&message.sender_id) {
            return false;
        }
        self.increment(&message.sender_id);
        true
    }

    /// Add one unread message from `sender`.
    pub fn increment(&mut self, sender: &UserId) -> u32 {
        let count = self.counts.entry(sender.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Drop the entry for `partner`, returning the previous count.
    pub fn clear(&mut self, partner: &UserId) -> u32 {
        self.counts.remove(partner).unwrap_or(0)
    }

    /// Replace all counts with a snapshot from the store.
    ///
    /// Zero entries and the active partner are left out.
    pub fn seed(&mut self, snapshot: HashMap<UserId, u32>, active: Option<&UserId>) {
        self.counts = snapshot
            .into_iter()
            .filter(|(sender, count)| *count > 0 && Some(sender) != active)
            .collect();
    }

    /// Unread count for `partner` (zero when absent).
    pub fn get(&self, partner: &UserId) -> u32 {
        self.counts.get(partner).copied().unwrap_or(0)
    }

    /// Whether `partner` has an entry.
    pub fn contains(&self, partner: &UserId) -> bool {
        self.counts.contains_key(partner)
    }

    /// Sum over all partners.
    pub fn total(&self) -> u32 {
        self.counts.values().fold(0u32, |acc, c| acc.saturating_add(*c))
    }

    /// Iterate over `(sender, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, u32)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.counts.clear();
    }
}
