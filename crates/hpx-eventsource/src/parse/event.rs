//! Parser output types.

use core::time::Duration;

/// A dispatched `message`-style event assembled from one or more field lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// The event type (`event:` field, `"message"` when unspecified).
    pub event: String,
    /// The data payload, one line per `data:` field, without the final newline.
    pub data: String,
    /// The connection's last event id as of this dispatch.
    pub last_event_id: String,
    /// Origin (`scheme://host[:port]`) of the URL the stream was opened with.
    pub origin: String,
}

/// Items produced by [`EventStreamParser::feed`](super::EventStreamParser::feed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutput {
    /// A complete event ended by a blank line.
    Message(MessageEvent),
    /// A valid `retry:` directive, in milliseconds.
    Retry(Duration),
}

impl ParseOutput {
    /// Returns the message if this output is one.
    pub fn into_message(self) -> Option<MessageEvent> {
        match self {
            Self::Message(message) => Some(message),
            Self::Retry(_) => None,
        }
    }
}
