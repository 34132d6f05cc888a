//! Incremental `text/event-stream` parsing.
//!
//! [`EventStreamParser`] consumes arbitrarily split byte chunks and emits
//! [`ParseOutput`]s as soon as a blank line completes an event. It never
//! fails: unknown fields, comment lines and malformed values are dropped.
//! [`EventStream`] adapts the parser to any byte-chunk [`Stream`](futures_core::Stream).

pub(crate) mod constants;
pub mod event;
pub mod event_stream;
pub mod parser;

pub use constants::{LAST_EVENT_ID, MAX_OVER_ALLOCATION};
pub use event::{MessageEvent, ParseOutput};
pub use event_stream::EventStream;
pub use parser::EventStreamParser;
