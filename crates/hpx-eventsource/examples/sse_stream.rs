//! SSE Stream Example
//!
//! Connects to an event stream and prints every notification until the
//! connection closes or Ctrl-C is pressed.
//!
//! Run with: `cargo run -p hpx-eventsource --example sse_stream -- <url>`

use std::time::Duration;

use hpx_eventsource::{SseConfig, SseConnection, SseEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/events".to_string());

    let config = SseConfig::new(url)
        .max_backoff(Duration::from_secs(30))
        .jitter_ratio(0.5)
        .retry_reset_interval(Duration::from_secs(60))
        .read_timeout(Duration::from_secs(90))
        // Retry dropped connections too, not only 5xx responses.
        .error_filter(|failure| {
            failure.status.is_none_or(|status| status.is_server_error())
        });

    let (handle, mut stream) = SseConnection::connect(config).await?.split();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.close();
            }
            event = stream.next_event() => match event {
                Some(SseEvent::Message(message)) => {
                    println!("[{}] id={:?} {}", message.event, message.last_event_id, message.data);
                }
                Some(SseEvent::Error(failure)) => println!("error: {failure}"),
                Some(SseEvent::Retrying { delay }) => println!("retrying in {delay:?}"),
                Some(SseEvent::Closed) | None => break,
                Some(other) => println!("{other}"),
            },
        }
    }

    Ok(())
}
