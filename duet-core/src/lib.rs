//! # duet-core
//!
//! Pure logic for duet (no I/O, instant tests).
//!
//! This crate implements the state containers and reconciliation rules of
//! the direct-messaging engine without any network access or async runtime.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (clocks are passed in, never read)
//! - Easy reasoning about reconciliation edge cases
//!
//! The actual I/O (store calls, subscriptions, timers) is performed by
//! `duet-client`, which feeds events into these containers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod log;
pub mod presence;
pub mod typing;
pub mod unread;

pub use directory::resolve_partners;
pub use log::{Delivery, InsertOutcome, LogEntry, MessageLog, PlaceholderIds};
pub use presence::OnlineSet;
pub use typing::{TypingIndicator, TypingThrottle, DEFAULT_TYPING_EXPIRY, DEFAULT_TYPING_THROTTLE};
pub use unread::UnreadCounts;
