//! Conversation partners and the connections that link them.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Public profile of a conversation partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// User identifier
    pub id: UserId,
    /// Name shown in the conversation list
    pub display_name: String,
    /// Avatar image reference
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Verification badge
    #[serde(default)]
    pub verified: bool,
    /// Headline or affiliation text
    #[serde(default)]
    pub headline: Option<String>,
}

impl Profile {
    /// Minimal profile with only an id and a display name.
    pub fn new(id: impl Into<UserId>, display_name: &str) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.to_string(),
            avatar_url: None,
            verified: false,
            headline: None,
        }
    }
}

/// State of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Waiting for the addressee
    Pending,
    /// Both sides agreed; the pair may message each other
    Accepted,
    /// Rejected by the addressee
    Declined,
}

/// A connection record between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// User who sent the request
    pub requester: Profile,
    /// User who received the request
    pub addressee: Profile,
    /// Request state
    pub status: ConnectionStatus,
}

impl Connection {
    /// Build an accepted connection between two profiles.
    pub fn accepted(requester: Profile, addressee: Profile) -> Self {
        Self {
            requester,
            addressee,
            status: ConnectionStatus::Accepted,
        }
    }

    /// The profile on the other side from `me`, if `me` is a participant.
    pub fn other_side(&self, me: &UserId) -> Option<&Profile> {
        if &self.requester.id == me {
            Some(&self.addressee)
        } else if &self.addressee.id == me {
            Some(&self.requester)
        } else {
            None
        }
    }
}
