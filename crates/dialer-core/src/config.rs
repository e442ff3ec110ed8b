//! Dialer configuration
//!
//! Configuration is split by component. Every section has sensible defaults
//! for an in-vehicle head unit, so an empty TOML document is a valid
//! configuration.
//!
//! # Usage Examples
//!
//! ```rust
//! use dialer_core::config::DialerConfig;
//! use std::time::Duration;
//!
//! let config = DialerConfig::from_toml_str(r#"
//!     [identity]
//!     lookup_timeout_ms = 1500
//!
//!     [audio]
//!     has_earpiece = true
//! "#).unwrap();
//!
//! assert_eq!(config.identity.lookup_timeout(), Duration::from_millis(1500));
//! assert!(config.audio.has_earpiece);
//! assert!(config.coordination.cross_account_hold);
//! ```
//!
//! ```rust
//! use dialer_core::config::DialerConfig;
//!
//! let config = DialerConfig::new()
//!     .with_lookup_timeout_ms(250)
//!     .with_earpiece(false)
//!     .with_cross_account_hold(false);
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio_route::AudioRoute;
use crate::error::{DialerError, DialerResult};

/// Top-level configuration for the dialer engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Call set coordination settings
    pub coordination: CoordinationConfig,
    /// Caller identity resolution settings
    pub identity: IdentityConfig,
    /// Audio routing settings
    pub audio: AudioConfig,
}

/// Settings for the call set coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Hold or disconnect calls on other accounts when a call becomes active
    pub cross_account_hold: bool,
    /// Capacity of the ordered view update broadcast channel
    pub update_channel_capacity: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            cross_account_hold: true,
            update_channel_capacity: 256,
        }
    }
}

/// Settings for the caller identity resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Deadline for a single directory lookup
    pub lookup_timeout_ms: u64,
    /// Maximum number of resolved identities kept in memory
    pub cache_capacity: usize,
    /// Initials shown for callers known only by number
    pub fallback_initials: String,
}

impl IdentityConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 5_000,
            cache_capacity: 512,
            fallback_initials: "#".to_string(),
        }
    }
}

/// Settings for the audio route coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Whether the device has a handset earpiece (head units usually don't)
    pub has_earpiece: bool,
    /// Route assumed to be available even with no link connected
    pub built_in_route: AudioRoute,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            has_earpiece: false,
            built_in_route: AudioRoute::Speaker,
        }
    }
}

impl DialerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> DialerResult<Self> {
        let config: DialerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> DialerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DialerError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_lookup_timeout_ms(mut self, millis: u64) -> Self {
        self.identity.lookup_timeout_ms = millis;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.identity.cache_capacity = capacity;
        self
    }

    pub fn with_earpiece(mut self, has_earpiece: bool) -> Self {
        self.audio.has_earpiece = has_earpiece;
        self
    }

    pub fn with_cross_account_hold(mut self, enabled: bool) -> Self {
        self.coordination.cross_account_hold = enabled;
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> DialerResult<()> {
        if self.identity.lookup_timeout_ms == 0 {
            return Err(DialerError::config("identity.lookup_timeout_ms must be greater than zero"));
        }
        if self.identity.cache_capacity == 0 {
            return Err(DialerError::config("identity.cache_capacity must be greater than zero"));
        }
        if self.coordination.update_channel_capacity == 0 {
            return Err(DialerError::config(
                "coordination.update_channel_capacity must be greater than zero",
            ));
        }
        if !self.audio.built_in_route.is_built_in() {
            return Err(DialerError::config(format!(
                "audio.built_in_route must be speaker or earpiece, got {}",
                self.audio.built_in_route
            )));
        }
        if self.audio.built_in_route == AudioRoute::Earpiece && !self.audio.has_earpiece {
            return Err(DialerError::config("audio.built_in_route is earpiece but has_earpiece is false"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = DialerConfig::from_toml_str("").unwrap();
        assert_eq!(config, DialerConfig::default());
        assert_eq!(config.identity.lookup_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = DialerConfig::from_toml_str("[identity]\nlookup_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, DialerError::Configuration { .. }));
    }

    #[test]
    fn test_rejects_unknown_route_names() {
        let err = DialerConfig::from_toml_str("[audio]\nbuilt_in_route = \"hyperspace\"\n").unwrap_err();
        assert!(matches!(err, DialerError::Configuration { .. }));
    }

    #[test]
    fn test_earpiece_route_requires_earpiece() {
        let mut config = DialerConfig::new();
        config.audio.built_in_route = AudioRoute::Earpiece;
        assert!(config.validate().is_err());
        assert!(config.with_earpiece(true).validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = DialerConfig::from_file("/nonexistent/dialer.toml").unwrap_err();
        assert!(matches!(err, DialerError::Configuration { .. }));
    }
}
