//! Conversation partner resolution.
//!
//! Turns the caller's connection records into the list of people they can
//! message. Connection data is expected to be clean, but the resolver does
//! not rely on it: non-accepted records, self-pairs and duplicates are dropped.

use std::collections::HashSet;

use duet_types::{Connection, ConnectionStatus, Profile, UserId};

/// Resolve the deduplicated list of partners for `me`.
///
/// For every accepted connection where `me` is either side, the other side's
/// profile is selected. The first occurrence of each partner wins; the order
/// of first occurrences is preserved.
pub fn resolve_partners(me: &UserId, connections: &[Connection]) -> Vec<Profile> {
    let mut seen = HashSet::new();
    connections
        .iter()
        .filter(|c| c.status == ConnectionStatus::Accepted)
        .filter_map(|c| c.other_side(me))
        .filter(|p| &p.id != me)
        .filter(|p| seen.insert(p.id.clone()))
        .cloned()
        .collect()
}
