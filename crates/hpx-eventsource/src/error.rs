//! Error handling for connection setup and transports.

use std::time::Duration;

use thiserror::Error;

/// The main result type used throughout the crate.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Errors returned by fallible operations.
///
/// Failures of a running stream are not returned as errors; the connection
/// turns them into [`StreamFailure`](crate::StreamFailure)s and delivers them
/// as events.
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// HTTP client errors (wraps `reqwest::Error`)
    #[cfg(feature = "reqwest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transport errors raised by custom transports
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A header name or value could not be encoded
    #[error("Invalid header: {message}")]
    InvalidHeader { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl From<url::ParseError> for EventSourceError {
    fn from(e: url::ParseError) -> Self {
        Self::config(format!("Invalid URL: {e}"))
    }
}

impl From<http::header::InvalidHeaderValue> for EventSourceError {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader {
            message: e.to_string(),
        }
    }
}

impl EventSourceError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }
}
