//! Core type definitions for SSE connections.

use std::{fmt, time::Duration};

use http::StatusCode;

pub use crate::parse::event::MessageEvent;
use crate::error::EventSourceError;

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Waiting for a response, or waiting to reconnect.
    Connecting,
    /// A `200` response is being streamed.
    Open,
    /// Terminal. No further reconnects happen.
    Closed,
}

impl ReadyState {
    /// Returns `true` if the connection is streaming events.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the connection is in its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Describes why a stream stopped delivering events.
///
/// Transport failures carry only a message, HTTP failures carry a status and
/// its reason phrase, and a stream that simply ended carries neither.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamFailure {
    /// HTTP status of the failed response, if the failure came from one.
    pub status: Option<StatusCode>,
    /// Human-readable description.
    pub message: Option<String>,
}

impl StreamFailure {
    /// The response body ended without an error.
    pub fn end() -> Self {
        Self::default()
    }

    /// A response with an unexpected status.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            message: status.canonical_reason().map(str::to_owned),
        }
    }

    /// A response with an unexpected status and a custom message.
    pub fn status_with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
        }
    }

    /// An I/O failure, timeout or abrupt close.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: Some(message.into()),
        }
    }

    /// Returns `true` for the end-of-stream descriptor.
    pub fn is_end(&self) -> bool {
        self.status.is_none() && self.message.is_none()
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.message.as_deref()) {
            (Some(status), Some(message)) => write!(f, "{}: {message}", status.as_u16()),
            (Some(status), None) => write!(f, "{}", status.as_u16()),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("stream ended"),
        }
    }
}

impl From<&EventSourceError> for StreamFailure {
    fn from(err: &EventSourceError) -> Self {
        Self::transport(err.to_string())
    }
}

/// Notification delivered through [`SseStream`](crate::SseStream).
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum SseEvent {
    /// A `200` response was received and is being streamed.
    Open,
    /// A dispatched message.
    Message(MessageEvent),
    /// The stream failed.
    Error(StreamFailure),
    /// The stream ended without an error.
    End,
    /// A reconnect has been scheduled.
    Retrying {
        /// How long the connection waits before reconnecting.
        delay: Duration,
    },
    /// The connection is closed for good.
    Closed,
}

impl SseEvent {
    /// The event type name (`open`, `message`, `error`, `end`, `retrying`,
    /// `closed`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message(_) => "message",
            Self::Error(_) => "error",
            Self::End => "end",
            Self::Retrying { .. } => "retrying",
            Self::Closed => "closed",
        }
    }

    /// The message payload, if this is a message.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Consume the event and return the message payload, if any.
    pub fn into_message(self) -> Option<MessageEvent> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// The failure descriptor, if this is an error.
    pub fn as_error(&self) -> Option<&StreamFailure> {
        match self {
            Self::Error(failure) => Some(failure),
            _ => None,
        }
    }

    /// The reconnect delay, if this is a retry notification.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Retrying { delay } => Some(*delay),
            _ => None,
        }
    }

    /// Returns `true` for the terminal notification.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}
