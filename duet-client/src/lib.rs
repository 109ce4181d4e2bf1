//! # duet-client
//!
//! Realtime direct-messaging engine for duet.
//!
//! This is the library an application embeds to show a two-party chat: the
//! partner list, who is online, the active conversation with optimistic
//! sends, typing indicators and per-partner unread badges.
//!
//! ## Features
//!
//! - **Optimistic sends**: placeholders appear immediately and are replaced
//!   in place when the store confirms
//! - **Presence**: online set rebuilt from full snapshots
//! - **Typing indicators**: throttled outgoing signals, expiring incoming ones
//! - **Backend abstraction**: pluggable store and realtime layer (memory, hosted)
//! - **Pure state**: uses duet-core for side-effect-free reconciliation
//!
//! ## Example
//!
//! ```ignore
//! use duet_client::{EngineConfig, MemoryBackend, Session};
//!
//! let backend = MemoryBackend::new();
//! let mut session = Session::start(EngineConfig::default(), backend, "alice".into()).await?;
//!
//! session.open_conversation("bob".into()).await;
//! session.send("hi", None);
//!
//! let log = session.log().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod presence;
pub mod session;
pub mod typing;
pub mod unread;

pub use backend::{
    Backend, BackendError, ChangeFeed, ChangeFilter, ChannelSubscription, Directory,
    FeedSubscription, MemoryBackend, MessageStore, Realtime, SubscriptionId, UnreadSnapshot,
};
pub use config::{ConfigError, EngineConfig, PresenceConfig, TypingConfig, UnreadConfig};
pub use conversation::Conversation;
pub use presence::PresenceTracker;
pub use session::Session;
pub use typing::{TypingClear, TypingSignal};
pub use unread::UnreadListener;
