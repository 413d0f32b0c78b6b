//! Error types for callback delivery.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, CallbackError>;

/// Transport-level failures while invoking a consumer callback.
///
/// HTTP responses of any status come back as a successful
/// [`CallbackOutcome`](crate::client::CallbackOutcome); only failures to
/// complete the exchange land here.
#[derive(Debug, Clone, Error)]
pub enum CallbackError {
    /// The request did not complete within the configured timeout.
    #[error("callback timed out after {timeout_seconds}s")]
    Timeout {
        /// Configured timeout that was exceeded.
        timeout_seconds: u64,
    },

    /// Connection-level failure before a response arrived.
    #[error("callback connection failed: {message}")]
    Network {
        /// Driver error description.
        message: String,
    },

    /// The HTTP client could not be built from its configuration.
    #[error("invalid callback client configuration: {message}")]
    Configuration {
        /// What was wrong with the configuration.
        message: String,
    },
}

impl CallbackError {
    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}
