//! # hpx-eventsource
//!
//! Reconnecting Server-Sent Events (`text/event-stream`) client.
//!
//! This crate keeps a long-lived HTTP request open, parses the response body
//! incrementally into events, and reconnects on failure with configurable
//! backoff and jitter while resuming from the last seen event id.
//!
//! ## Features
//!
//! - **Incremental parsing**: chunks may split lines, `CRLF` pairs and UTF-8
//!   sequences anywhere; memory overhead of the working buffer is bounded
//! - **Reconnection**: server `retry:` directives, exponential backoff,
//!   jitter and reset after a healthy period
//! - **Redirects**: `301` replaces the URL, `307` is used once
//! - **Retry policy**: a single [`ErrorFilter`] decides for every failure
//! - **Pluggable transport**: [`SseTransport`], with a `reqwest` default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use hpx_eventsource::{SseConfig, SseConnection, SseEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SseConfig::new("https://example.com/events")
//!         .max_backoff(Duration::from_secs(30))
//!         .jitter_ratio(0.5);
//!
//!     let (handle, mut stream) = SseConnection::connect(config).await?.split();
//!     while let Some(event) = stream.next_event().await {
//!         match event {
//!             SseEvent::Message(message) => println!("{}: {}", message.event, message.data),
//!             SseEvent::Closed => break,
//!             other => println!("{other}"),
//!         }
//!     }
//!     handle.close();
//!     Ok(())
//! }
//! ```

pub mod capacity;
pub mod config;
pub mod connection;
pub mod error;
pub mod parse;
pub mod retry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{ErrorFilter, SseConfig};
pub use connection::{SseConnection, SseHandle, SseStream};
pub use error::{EventSourceError, EventSourceResult};
pub use parse::{EventStream, EventStreamParser, LAST_EVENT_ID, MessageEvent, ParseOutput};
pub use retry::{Backoff, ExponentialBackoff, Jitter, RatioJitter, RetryDelayStrategy};
#[cfg(feature = "reqwest")]
pub use transport::reqwest::ReqwestTransport;
pub use transport::{SseTransport, TransportRequest, TransportResponse};
pub use types::{ReadyState, SseEvent, StreamFailure};
