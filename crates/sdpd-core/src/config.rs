//! Server configuration
//!
//! Limits the query handlers enforce plus the interoperability lists. Every
//! field has a default so a partial TOML file deserializes cleanly.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::interop::InteropConfig;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Smallest MTU a connection may negotiate
pub const MIN_MTU: u16 = 48;

/// MTU assumed when the transport does not report one
pub const DEFAULT_MTU: u16 = 672;

/// Handles returned by one search at most, whatever the client asks for
pub const DEFAULT_MAX_HANDLES: u16 = 30;

/// Largest attribute entry that may be split across frames
pub const DEFAULT_MAX_ATTRIBUTE_LEN: usize = 400;

/// Idle time after which a connection is closed
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 30;

// ----------------------------------------------------------------------------
// Server Configuration
// ----------------------------------------------------------------------------

/// Configuration shared by every connection of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// MTU used for connections whose transport does not negotiate one
    pub default_mtu: u16,
    /// Server cap on handles per search response
    pub max_handles_per_search: u16,
    /// Attribute entries at least this long fail instead of being split
    pub max_attribute_len: usize,
    /// Seconds of inactivity before a connection is dropped
    pub inactivity_timeout_secs: u64,
    /// Include a short description in error responses
    pub error_text: bool,
    /// Peer-specific response downgrades
    pub interop: InteropConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_mtu: DEFAULT_MTU,
            max_handles_per_search: DEFAULT_MAX_HANDLES,
            max_attribute_len: DEFAULT_MAX_ATTRIBUTE_LEN,
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            error_text: false,
            interop: InteropConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback MTU
    pub fn with_default_mtu(mut self, mtu: u16) -> Self {
        self.default_mtu = mtu;
        self
    }

    /// Set the per-search handle cap
    pub fn with_max_handles_per_search(mut self, max: u16) -> Self {
        self.max_handles_per_search = max;
        self
    }

    /// Set the largest splittable attribute
    pub fn with_max_attribute_len(mut self, len: usize) -> Self {
        self.max_attribute_len = len;
        self
    }

    /// Set the inactivity timeout
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout_secs = timeout.as_secs();
        self
    }

    /// Enable or disable error response text
    pub fn with_error_text(mut self, enabled: bool) -> Self {
        self.error_text = enabled;
        self
    }

    /// Set the interoperability lists
    pub fn with_interop(mut self, interop: InteropConfig) -> Self {
        self.interop = interop;
        self
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    /// Check the limits are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_mtu < MIN_MTU {
            return Err(ConfigError::MtuTooSmall {
                mtu: self.default_mtu,
                min: MIN_MTU,
            });
        }
        if self.max_handles_per_search == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_handles_per_search",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_attribute_len == 0 || self.max_attribute_len > u16::MAX as usize {
            return Err(ConfigError::InvalidValue {
                field: "max_attribute_len",
                reason: format!("{} is outside 1..=65535", self.max_attribute_len),
            });
        }
        if self.inactivity_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "inactivity_timeout_secs",
                reason: "must be at least one second".to_string(),
            });
        }
        crate::interop::InteropPolicy::from_config(&self.interop)?;
        Ok(())
    }
}
