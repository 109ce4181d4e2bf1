//! Typing indicator timing.
//!
//! Send side: [`TypingThrottle`] lets the first keystroke of a burst through
//! and suppresses the rest until the window has elapsed (throttle, not
//! debounce).
//!
//! Receive side: [`TypingIndicator`] shows the indicator when the expected
//! peer signals and keeps a single hide deadline that each new signal pushes
//! back. There is no "stopped typing" message; the indicator clears on
//! timeout or when the peer's message arrives.
//!
//! Both take the current instant as input so behavior is deterministic.

use std::time::{Duration, Instant};

use duet_types::{Broadcast, UserId};

/// Minimum spacing between outgoing typing broadcasts.
pub const DEFAULT_TYPING_THROTTLE: Duration = Duration::from_millis(2000);

/// How long the indicator stays visible after the last signal.
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_millis(3000);

/// Outgoing typing throttle.
#[derive(Debug, Clone)]
pub struct TypingThrottle {
    window: Duration,
    last_sent: Option<Instant>,
}

impl TypingThrottle {
    /// Create a throttle with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: None,
        }
    }

    /// Register a keystroke at `now`; returns whether a broadcast should be sent.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        let due = match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        };
        if due {
            self.last_sent = Some(now);
        }
        due
    }
}

impl Default for TypingThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_THROTTLE)
    }
}

/// Incoming typing indicator for one peer.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    peer: UserId,
    expiry: Duration,
    hide_at: Option<Instant>,
}

impl TypingIndicator {
    /// Create a hidden indicator for `peer`.
    pub fn new(peer: UserId, expiry: Duration) -> Self {
        Self {
            peer,
            expiry,
            hide_at: None,
        }
    }

    /// Handle a broadcast received at `now`.
    ///
    /// Signals from anyone but the peer are ignored. Returns whether the
    /// signal was accepted (and the deadline re-armed).
    pub fn on_broadcast(&mut self, broadcast: &Broadcast, now: Instant) -> bool {
        match broadcast {
            Broadcast::Typing { user_id } if user_id == &self.peer => {
                self.hide_at = Some(now + self.expiry);
                true
            }
            Broadcast::Typing { .. } => false,
        }
    }

    /// The pending hide deadline, if visible.
    pub fn deadline(&self) -> Option<Instant> {
        self.hide_at
    }

    /// Whether the indicator is visible at `now`.
    pub fn is_visible(&self, now: Instant) -> bool {
        self.hide_at.is_some_and(|at| now < at)
    }

    /// Hide the indicator if its deadline has passed; returns whether it was hidden.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.hide_at {
            Some(at) if now >= at => {
                self.hide_at = None;
                true
            }
            _ => false,
        }
    }

    /// Hide immediately (peer's message arrived, or conversation closed).
    pub fn clear(&mut self) -> bool {
        self.hide_at.take().is_some()
    }
}
