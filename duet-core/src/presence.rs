//! Online set rebuilt from presence snapshots.
//!
//! The set is never patched with join/leave deltas. Every sync replaces it
//! with the membership in the snapshot, so a missed or reordered delta cannot
//! leave a stale entry behind.

use std::collections::HashSet;

use duet_types::{PresenceMeta, UserId};

/// Users currently holding a presence registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineSet {
    users: HashSet<UserId>,
}

impl OnlineSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with the members of a sync snapshot.
    ///
    /// A user registered from several connections appears once.
    pub fn replace(&mut self, members: &[PresenceMeta]) {
        self.users = members.iter().map(|m| m.user_id.clone()).collect();
    }

    /// Whether `user` is online.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Iterate over online users (unordered).
    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.users.iter()
    }

    /// Forget everyone (session end).
    pub fn clear(&mut self) {
        self.users.clear();
    }
}
