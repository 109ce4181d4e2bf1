//! # duet-types
//!
//! Data model for the duet direct-messaging engine.
//!
//! This crate provides the foundational types used across all duet crates:
//! - [`UserId`], [`MessageId`], [`Timestamp`], [`ConversationKey`] - Identity and ordering types
//! - [`Message`], [`NewMessage`] - Persisted direct messages
//! - [`Profile`], [`Connection`] - Conversation partners
//! - [`ChangeEvent`], [`ChannelEvent`] - Push payloads from the realtime backend
//! - [`TypesError`] - Payload validation errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod message;
mod profile;

pub use error::TypesError;
pub use event::{Broadcast, ChangeEvent, ChannelEvent, PresenceMeta, RawChange};
pub use ids::{ConversationKey, MessageId, Timestamp, UserId, PLACEHOLDER_PREFIX};
pub use message::{Attachment, Message, NewMessage};
pub use profile::{Connection, ConnectionStatus, Profile};
