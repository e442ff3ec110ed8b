//! Error types for the dialer core library

use thiserror::Error;

use crate::call::CallHandle;

/// Result type for dialer core operations
pub type DialerResult<T> = Result<T, DialerError>;

/// Errors that can occur in the dialer core
///
/// None of these escape the event-handling entry points of the coordinators;
/// they are returned only from command-style APIs that may be refused locally
/// (merge, route selection, configuration loading) and from collaborator
/// implementations, whose failures are logged and absorbed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DialerError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Merge refused before reaching the telephony stack
    #[error("Cannot merge {primary} with {secondary}: {reason}")]
    MergeNotAllowed {
        primary: CallHandle,
        secondary: CallHandle,
        reason: String,
    },

    /// Requested audio route is not currently available
    #[error("Audio route {route} is not supported right now")]
    UnsupportedRoute { route: String },

    /// The telephony collaborator rejected or failed a command
    #[error("Telephony command {command} failed: {message}")]
    Collaborator { command: String, message: String },

    /// Directory lookup failed
    #[error("Contact lookup failed: {message}")]
    Lookup { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DialerError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a collaborator command error
    pub fn collaborator(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a lookup error
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for DialerError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_refused_operation() {
        let err = DialerError::MergeNotAllowed {
            primary: CallHandle(1),
            secondary: CallHandle(2),
            reason: "calls are on different accounts".into(),
        };
        assert_eq!(err.to_string(), "Cannot merge call#1 with call#2: calls are on different accounts");

        let err = DialerError::collaborator("hold", "telephony bridge is gone");
        assert_eq!(err.to_string(), "Telephony command hold failed: telephony bridge is gone");
    }

    #[test]
    fn test_toml_errors_become_configuration_errors() {
        let err: DialerError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert!(matches!(err, DialerError::Configuration { .. }));
    }
}
