//! SSE connection configuration.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::{
    parse::LAST_EVENT_ID,
    retry::{ExponentialBackoff, RatioJitter, RetryDelayStrategy},
    types::StreamFailure,
};

/// Decides whether a failed stream should be reconnected.
///
/// The default policy retries only `500`, `502`, `503` and `504` responses.
/// Transport errors and a stream that simply ended are not retried.
#[derive(Clone)]
pub struct ErrorFilter(Arc<dyn Fn(&StreamFailure) -> bool + Send + Sync>);

impl ErrorFilter {
    /// Wrap a predicate returning `true` for failures that should be retried.
    pub fn new(filter: impl Fn(&StreamFailure) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(filter))
    }

    /// Retry every failure, including a clean end of stream.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Never retry.
    pub fn never() -> Self {
        Self::new(|_| false)
    }

    /// Returns `true` if `failure` should be retried.
    pub fn should_retry(&self, failure: &StreamFailure) -> bool {
        (self.0)(failure)
    }
}

impl Default for ErrorFilter {
    fn default() -> Self {
        Self::new(default_error_filter)
    }
}

impl fmt::Debug for ErrorFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorFilter").finish_non_exhaustive()
    }
}

fn default_error_filter(failure: &StreamFailure) -> bool {
    failure
        .status
        .is_some_and(|status| matches!(status.as_u16(), 500 | 502 | 503 | 504))
}

/// Configuration for SSE connections.
///
/// Provides sensible defaults and chainable setter methods.
#[derive(Clone, Debug)]
pub struct SseConfig {
    /// SSE endpoint URL.
    pub url: String,
    /// HTTP method (`GET`, or `POST` for APIs that take a request body).
    pub method: Method,
    /// Additional HTTP headers to include with every SSE request.
    ///
    /// A `Last-Event-ID` header here seeds the connection's last event id.
    pub headers: HeaderMap,
    /// Do not send the default `Cache-Control` and `Accept` headers.
    pub skip_default_headers: bool,
    /// Optional request body (for POST-based SSE).
    pub body: Option<Bytes>,
    /// Base delay before reconnecting. A server `retry:` field replaces it.
    pub initial_retry_delay: Duration,
    /// How long a connection must stay healthy before backoff is reset.
    pub retry_reset_interval: Option<Duration>,
    /// Enables exponential backoff capped at this delay.
    pub max_backoff: Option<Duration>,
    /// Enables jitter removing up to this ratio (0.0–1.0) of each delay.
    pub jitter_ratio: Option<f64>,
    /// Fail the stream if no bytes arrive for this long.
    pub read_timeout: Option<Duration>,
    /// Time allowed for the response head to arrive. Falls back to
    /// `read_timeout` when unset.
    pub connect_timeout: Option<Duration>,
    /// Proxy URL that every request is routed through.
    pub proxy: Option<String>,
    /// Accept invalid TLS certificates.
    pub accept_invalid_certs: bool,
    /// Extra PEM-encoded root certificates to trust.
    pub root_certificates: Vec<Vec<u8>>,
    /// Send credentials with cross-origin requests.
    ///
    /// Only meaningful for browser-backed transports.
    pub with_credentials: bool,
    /// Maximum consecutive redirects before the connection fails.
    pub max_redirects: u32,
    /// Retry policy applied to every failure.
    pub error_filter: ErrorFilter,
    /// Capacity of the event channel.
    pub event_channel_capacity: usize,
    /// Capacity of the command channel.
    pub command_channel_capacity: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: Method::GET,
            headers: HeaderMap::new(),
            skip_default_headers: false,
            body: None,
            initial_retry_delay: Duration::from_millis(1000),
            retry_reset_interval: None,
            max_backoff: None,
            jitter_ratio: None,
            read_timeout: None,
            connect_timeout: None,
            proxy: None,
            accept_invalid_certs: false,
            root_certificates: Vec::new(),
            with_credentials: false,
            max_redirects: 10,
            error_filter: ErrorFilter::default(),
            event_channel_capacity: 256,
            command_channel_capacity: 64,
        }
    }
}

impl SseConfig {
    /// Create a new SSE configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the HTTP method (e.g., `POST` for POST-based SSE).
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Suppress the default `Cache-Control` and `Accept` headers.
    #[must_use]
    pub fn skip_default_headers(mut self, skip: bool) -> Self {
        self.skip_default_headers = skip;
        self
    }

    /// Set the request body (for POST-based SSE).
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub fn initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// Reset accumulated backoff after the connection stays healthy this long.
    #[must_use]
    pub fn retry_reset_interval(mut self, interval: Duration) -> Self {
        self.retry_reset_interval = Some(interval);
        self
    }

    /// Enable exponential backoff capped at `max`.
    #[must_use]
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = Some(max);
        self
    }

    /// Enable jitter.
    #[must_use]
    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = Some(ratio);
        self
    }

    /// Set the read-inactivity timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Route requests through a proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Accept invalid TLS certificates.
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Trust an additional PEM-encoded root certificate.
    #[must_use]
    pub fn root_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.root_certificates.push(pem.into());
        self
    }

    /// Set whether credentials accompany cross-origin requests.
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set the maximum number of consecutive redirects.
    #[must_use]
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn error_filter(
        mut self,
        filter: impl Fn(&StreamFailure) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.error_filter = ErrorFilter::new(filter);
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set the command channel capacity.
    #[must_use]
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    /// The `Last-Event-ID` supplied in [`headers`](Self::headers), if any.
    pub fn initial_last_event_id(&self) -> Option<&str> {
        self.headers
            .get(&LAST_EVENT_ID)
            .and_then(|value| value.to_str().ok())
    }

    /// Build the reconnect delay strategy described by this configuration.
    pub fn retry_strategy(&self) -> RetryDelayStrategy {
        let mut strategy = RetryDelayStrategy::new(self.initial_retry_delay);
        if let Some(interval) = self.retry_reset_interval {
            strategy = strategy.with_reset_interval(interval);
        }
        if let Some(max) = self.max_backoff {
            strategy = strategy.with_backoff(ExponentialBackoff::new(max));
        }
        if let Some(ratio) = self.jitter_ratio {
            strategy = strategy.with_jitter(RatioJitter::new(ratio));
        }
        strategy
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if let Err(e) = url::Url::parse(&self.url) {
            return Err(format!("Invalid URL: {e}"));
        }
        if self.method != Method::GET && self.method != Method::POST {
            return Err("Method must be GET or POST".to_string());
        }
        if let Some(ratio) = self.jitter_ratio
            && !(0.0..=1.0).contains(&ratio)
        {
            return Err("Jitter ratio must be between 0.0 and 1.0".to_string());
        }
        if let Some(max) = self.max_backoff
            && max < self.initial_retry_delay
        {
            return Err("Max backoff must be >= initial retry delay".to_string());
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Read timeout must be > 0".to_string());
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err("Event channel capacity must be > 0".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("Command channel capacity must be > 0".to_string());
        }
        Ok(())
    }
}
