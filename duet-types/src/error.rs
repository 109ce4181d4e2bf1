//! Error types for duet payloads.

use thiserror::Error;

/// Errors raised while validating payloads from the realtime backend.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Change payload carried an event kind we do not handle
    #[error("unknown change kind: {0}")]
    UnknownChangeKind(String),

    /// Change record did not match the message schema
    #[error("invalid change record: {0}")]
    InvalidRecord(#[source] serde_json::Error),

    /// Encoding a record into a change payload failed
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}
