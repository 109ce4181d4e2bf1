//! Configuration loading for duet-client.
//!
//! Configuration is loaded from a TOML file. Every key is optional; missing
//! keys fall back to the defaults below.
//!
//! ```toml
//! [presence]
//! channel = "online-users"
//!
//! [typing]
//! throttle_ms = 2000
//! expiry_ms = 3000
//! channel_prefix = "typing"
//!
//! [unread]
//! seed_from_store = true
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a duet session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Presence channel configuration.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Typing signal configuration.
    #[serde(default)]
    pub typing: TypingConfig,
    /// Unread counter configuration.
    #[serde(default)]
    pub unread: UnreadConfig,
}

/// Presence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Name of the global presence channel (default: online-users).
    #[serde(default = "default_presence_channel")]
    pub channel: String,
}

/// Typing signal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TypingConfig {
    /// Minimum spacing between outgoing signals in ms (default: 2000).
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Indicator lifetime after the last signal in ms (default: 3000).
    #[serde(default = "default_expiry_ms")]
    pub expiry_ms: u64,
    /// Prefix of per-conversation typing channels (default: typing).
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

/// Unread counter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UnreadConfig {
    /// Seed counters from the store at session start (default: true).
    /// When off, counters start empty and only count live arrivals.
    #[serde(default = "default_seed_from_store")]
    pub seed_from_store: bool,
}

// Default value functions
fn default_presence_channel() -> String {
    "online-users".to_string()
}

fn default_throttle_ms() -> u64 {
    2000
}

fn default_expiry_ms() -> u64 {
    3000
}

fn default_channel_prefix() -> String {
    "typing".to_string()
}

fn default_seed_from_store() -> bool {
    true
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            channel: default_presence_channel(),
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            expiry_ms: default_expiry_ms(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

impl Default for UnreadConfig {
    fn default() -> Self {
        Self {
            seed_from_store: default_seed_from_store(),
        }
    }
}

impl TypingConfig {
    /// Outgoing throttle window.
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Incoming indicator lifetime.
    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}
