//! SSE connection driver implementation.
//!
//! Provides [`SseConnection`], [`SseHandle`], and [`SseStream`]. A background
//! task owns the request lifecycle: it follows `301`/`307` redirects, feeds
//! the response body into a fresh [`EventStreamParser`] per response, runs
//! every failure through the configured [`ErrorFilter`](crate::ErrorFilter)
//! and reconnects after the delay chosen by the [`RetryDelayStrategy`].

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream::BoxStream};
use http::{
    HeaderMap, HeaderValue, StatusCode,
    header::{ACCEPT, CACHE_CONTROL, LOCATION},
};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    time::{Instant, error::Elapsed, sleep, timeout},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    config::SseConfig,
    error::{EventSourceError, EventSourceResult},
    parse::{EventStreamParser, LAST_EVENT_ID, ParseOutput, constants::EVENT_STREAM_MIME},
    retry::RetryDelayStrategy,
    transport::{SseTransport, TransportRequest},
    types::{ReadyState, SseEvent, StreamFailure},
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// What the driver publishes to every [`SseHandle`].
#[derive(Clone, Debug)]
struct Shared {
    ready_state: ReadyState,
    last_event_id: String,
    reconnect_interval: Duration,
}

/// Control commands sent from [`SseHandle`] to the background task.
#[derive(Debug)]
enum SseCommand {
    Close,
}

// ---------------------------------------------------------------------------
// Public API: SseConnection
// ---------------------------------------------------------------------------

/// Entry point for SSE connections.
///
/// Call [`connect()`](SseConnection::connect) to start a connection and then
/// [`split()`](SseConnection::split) to obtain a [`SseHandle`] (for control)
/// and [`SseStream`] (for events).
///
/// The connection closes itself once every [`SseHandle`] has been dropped,
/// and stops silently once the [`SseStream`] has been dropped.
#[derive(Debug)]
pub struct SseConnection {
    handle: SseHandle,
    stream: SseStream,
}

impl SseConnection {
    /// Start a connection using the default [`ReqwestTransport`](crate::ReqwestTransport).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or the HTTP client
    /// cannot be built.
    #[cfg(feature = "reqwest")]
    pub async fn connect(config: SseConfig) -> EventSourceResult<Self> {
        config.validate().map_err(EventSourceError::config)?;
        let transport = crate::transport::reqwest::ReqwestTransport::from_config(&config)?;
        Self::connect_with_transport(config, transport).await
    }

    /// Start a connection that issues its requests through `transport`.
    ///
    /// Spawns a background task that drives the connection and forwards
    /// [`SseEvent`]s to the [`SseStream`].
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub async fn connect_with_transport<T: SseTransport>(
        config: SseConfig,
        transport: T,
    ) -> EventSourceResult<Self> {
        config.validate().map_err(EventSourceError::config)?;

        let url = Url::parse(&config.url)?;
        let origin = url.origin().ascii_serialization();
        let last_event_id = config.initial_last_event_id().unwrap_or_default().to_owned();

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_capacity);
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (shared_tx, shared_rx) = watch::channel(Shared {
            ready_state: ReadyState::Connecting,
            last_event_id: last_event_id.clone(),
            reconnect_interval: config.initial_retry_delay,
        });

        let driver = Driver {
            retry: config.retry_strategy(),
            reconnect_interval: config.initial_retry_delay,
            config: Arc::new(config),
            transport,
            url,
            reconnect_url: None,
            origin,
            last_event_id,
            redirects: 0,
            shared: shared_tx,
            cmd_rx,
            event_tx,
        };
        tokio::spawn(driver.run());

        let handle = SseHandle {
            cmd_tx,
            shared: shared_rx,
        };
        let stream = SseStream { rx: event_rx };

        Ok(Self { handle, stream })
    }

    /// Split the connection into a control handle and event stream.
    pub fn split(self) -> (SseHandle, SseStream) {
        (self.handle, self.stream)
    }

    /// Get a reference to the control handle.
    pub fn handle(&self) -> &SseHandle {
        &self.handle
    }

    /// Receive the next event.
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        self.stream.next_event().await
    }
}

impl Stream for SseConnection {
    type Item = SseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.stream).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// SseHandle
// ---------------------------------------------------------------------------

/// Clone-able handle for controlling a running SSE connection.
#[derive(Clone, Debug)]
pub struct SseHandle {
    cmd_tx: mpsc::Sender<SseCommand>,
    shared: watch::Receiver<Shared>,
}

impl SseHandle {
    /// Close the connection for good.
    ///
    /// Idempotent: only the first call on a live connection produces a
    /// [`SseEvent::Closed`]. Aborts an in-flight request and cancels a
    /// pending reconnect.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        match self.cmd_tx.try_send(SseCommand::Close) {
            // A full queue already holds a close request.
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {
                debug!("SSE driver already stopped, close request dropped");
            }
        }
    }

    /// Wait until the connection reaches [`ReadyState::Closed`].
    pub async fn closed(&self) {
        let mut shared = self.shared.clone();
        let _ = shared.wait_for(|s| s.ready_state.is_closed()).await;
    }

    /// Current lifecycle state.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.borrow().ready_state
    }

    /// Returns `true` once the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.ready_state().is_closed() || self.cmd_tx.is_closed()
    }

    /// The id sent as `Last-Event-ID` on the next reconnect.
    pub fn last_event_id(&self) -> String {
        self.shared.borrow().last_event_id.clone()
    }

    /// The most recent `retry:` value, or the initial retry delay.
    pub fn reconnect_interval(&self) -> Duration {
        self.shared.borrow().reconnect_interval
    }
}

// ---------------------------------------------------------------------------
// SseStream
// ---------------------------------------------------------------------------

/// Stream of [`SseEvent`]s from an SSE connection.
///
/// Implements [`Stream`] for use with `StreamExt` combinators. Ends after
/// [`SseEvent::Closed`].
#[derive(Debug)]
pub struct SseStream {
    rx: mpsc::Receiver<SseEvent>,
}

impl SseStream {
    /// Receive the next SSE event, waiting until one is available.
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        self.rx.recv().await
    }
}

impl Stream for SseStream {
    type Item = SseEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Internal: background driver
// ---------------------------------------------------------------------------

/// Result of one request.
enum Step {
    /// Followed a redirect; connect again right away.
    Redirect,
    /// The request or its body failed.
    Failed(StreamFailure),
    /// Closed, or nobody is listening any more.
    Stop,
}

/// The long-lived background task that drives the SSE connection.
struct Driver<T> {
    config: Arc<SseConfig>,
    transport: T,
    url: Url,
    /// URL to restore before the next reconnect after a temporary redirect.
    reconnect_url: Option<Url>,
    origin: String,
    last_event_id: String,
    reconnect_interval: Duration,
    retry: RetryDelayStrategy,
    /// Consecutive redirects since the last open or failure.
    redirects: u32,
    shared: watch::Sender<Shared>,
    cmd_rx: mpsc::Receiver<SseCommand>,
    event_tx: mpsc::Sender<SseEvent>,
}

impl<T: SseTransport> Driver<T> {
    async fn run(mut self) {
        loop {
            match self.connect_once().await {
                Step::Redirect => {}
                Step::Failed(failure) => {
                    if !self.fail(failure).await {
                        break;
                    }
                }
                Step::Stop => break,
            }
        }
        self.set_state(ReadyState::Closed);
        debug!(url = %self.url, "SSE driver stopped");
    }

    /// Issue one request and stream its body until it fails.
    async fn connect_once(&mut self) -> Step {
        let request = self.build_request();
        info!(url = %self.url, retry_count = self.retry.retry_count(), "SSE connecting");

        let head_timeout = self.config.connect_timeout.or(self.config.read_timeout);
        let send = bounded(head_timeout, self.transport.send(request));
        let result = tokio::select! {
            biased;

            _ = self.cmd_rx.recv() => {
                self.close().await;
                return Step::Stop;
            }
            () = self.event_tx.closed() => return Step::Stop,
            result = send => result,
        };

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Step::Failed(StreamFailure::from(&err)),
            Err(_) => return Step::Failed(self.head_timeout_failure()),
        };

        match response.status {
            StatusCode::MOVED_PERMANENTLY | StatusCode::TEMPORARY_REDIRECT => {
                return self.redirect(response.status, &response.headers);
            }
            StatusCode::OK => {}
            status => return Step::Failed(StreamFailure::status(status)),
        }

        self.redirects = 0;
        self.set_state(ReadyState::Open);
        info!(url = %self.url, "SSE connection established");
        if !self.emit(SseEvent::Open).await {
            return Step::Stop;
        }

        self.stream_body(response.body).await
    }

    /// Feed the response body to a new parser until it ends or fails.
    async fn stream_body(&mut self, mut body: BoxStream<'static, EventSourceResult<Bytes>>) -> Step {
        let mut parser = EventStreamParser::new(self.last_event_id.clone(), self.origin.clone());
        let mut outputs = Vec::new();

        loop {
            let read = bounded(self.config.read_timeout, body.next());
            let item = tokio::select! {
                biased;

                _ = self.cmd_rx.recv() => {
                    self.close().await;
                    return Step::Stop;
                }
                () = self.event_tx.closed() => return Step::Stop,
                item = read => item,
            };

            let chunk = match item {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(err))) => return Step::Failed(StreamFailure::from(&err)),
                Ok(None) => return Step::Failed(StreamFailure::end()),
                Err(_) => return Step::Failed(self.read_timeout_failure()),
            };

            parser.feed(&chunk, |output| outputs.push(output));
            for output in outputs.drain(..) {
                match output {
                    ParseOutput::Message(message) => {
                        if message.last_event_id != self.last_event_id {
                            self.last_event_id.clone_from(&message.last_event_id);
                            let id = &self.last_event_id;
                            self.shared.send_modify(|s| s.last_event_id.clone_from(id));
                        }
                        self.retry.mark_good(Instant::now().into_std());
                        debug!(
                            event_type = %message.event,
                            id = %message.last_event_id,
                            "SSE event received",
                        );
                        if !self.emit(SseEvent::Message(message)).await {
                            return Step::Stop;
                        }
                    }
                    ParseOutput::Retry(delay) => {
                        debug!(delay_ms = delay.as_millis() as u64, "SSE retry directive");
                        self.reconnect_interval = delay;
                        self.retry.set_base_delay(delay);
                        self.shared.send_modify(|s| s.reconnect_interval = delay);
                    }
                }
            }
        }
    }

    /// The response head did not arrive in time.
    fn head_timeout_failure(&self) -> StreamFailure {
        match self.config.connect_timeout {
            Some(limit) => StreamFailure::from(&EventSourceError::timeout(limit)),
            None => self.read_timeout_failure(),
        }
    }

    fn read_timeout_failure(&self) -> StreamFailure {
        let millis = self.config.read_timeout.unwrap_or_default().as_millis();
        StreamFailure::transport(format!(
            "Read timeout, received no data in {millis}ms, assuming connection is dead"
        ))
    }

    /// Follow a `301` or `307` response.
    fn redirect(&mut self, status: StatusCode, headers: &HeaderMap) -> Step {
        let location = headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| self.url.join(location).ok());
        let Some(location) = location else {
            warn!(url = %self.url, status = status.as_u16(), "SSE redirect without a valid Location");
            return Step::Failed(StreamFailure::status(status));
        };

        self.redirects = self.redirects.saturating_add(1);
        if self.redirects > self.config.max_redirects {
            return Step::Failed(StreamFailure::status_with_message(
                status,
                "too many redirects",
            ));
        }

        // Reconnects go back to the URL that answered with the latest 307.
        if status == StatusCode::TEMPORARY_REDIRECT {
            self.reconnect_url = Some(self.url.clone());
        }

        debug!(from = %self.url, to = %location, status = status.as_u16(), "SSE redirect");
        self.url = location;
        Step::Redirect
    }

    /// Run `failure` through the error filter. Returns `true` to reconnect.
    async fn fail(&mut self, failure: StreamFailure) -> bool {
        if self.ready_state().is_closed() {
            return false;
        }
        self.redirects = 0;

        let should_retry = self.config.error_filter.should_retry(&failure);
        let event = if failure.is_end() {
            SseEvent::End
        } else {
            SseEvent::Error(failure.clone())
        };

        if !should_retry {
            error!(url = %self.url, failure = %failure, "SSE connection failed, not retrying");
            let _ = self.emit(event).await;
            self.close().await;
            return false;
        }

        self.set_state(ReadyState::Connecting);
        warn!(url = %self.url, failure = %failure, "SSE connection failed");
        if !self.emit(event).await {
            return false;
        }

        let delay = self.retry.next_delay(Instant::now().into_std());
        if let Some(url) = self.reconnect_url.take() {
            self.url = url;
        }
        warn!(
            retry_count = self.retry.retry_count(),
            delay_ms = delay.as_millis() as u64,
            reconnect_interval_ms = self.reconnect_interval.as_millis() as u64,
            "SSE reconnecting after backoff"
        );
        if !self.emit(SseEvent::Retrying { delay }).await {
            return false;
        }

        tokio::select! {
            biased;

            _ = self.cmd_rx.recv() => {
                self.close().await;
                return false;
            }
            () = self.event_tx.closed() => return false,
            () = sleep(delay) => {}
        }

        self.ready_state() == ReadyState::Connecting
    }

    fn build_request(&self) -> TransportRequest {
        let mut headers = HeaderMap::new();
        if !self.config.skip_default_headers {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM_MIME));
        }
        headers.extend(self.config.headers.clone());

        if !self.last_event_id.is_empty() {
            match last_event_id_header(&self.last_event_id) {
                Ok(value) => {
                    headers.insert(LAST_EVENT_ID, value);
                }
                Err(e) => {
                    warn!(id = ?self.last_event_id, error = %e, "Skipping Last-Event-ID header");
                }
            }
        }

        TransportRequest {
            url: self.url.clone(),
            method: self.config.method.clone(),
            headers,
            body: self.config.body.clone(),
            with_credentials: self.config.with_credentials,
        }
    }

    /// Close the connection, emitting [`SseEvent::Closed`] once.
    async fn close(&self) {
        if self.set_state(ReadyState::Closed) {
            info!(url = %self.url, "SSE connection closed");
            let _ = self.event_tx.send(SseEvent::Closed).await;
        }
    }

    /// Returns `false` if the consumer has gone away.
    async fn emit(&self, event: SseEvent) -> bool {
        if self.event_tx.send(event).await.is_err() {
            info!("SSE consumer dropped, shutting down");
            return false;
        }
        true
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.borrow().ready_state
    }

    /// Returns `true` if the state changed.
    fn set_state(&self, state: ReadyState) -> bool {
        self.shared.send_if_modified(|s| {
            if s.ready_state == state {
                return false;
            }
            s.ready_state = state;
            true
        })
    }
}

/// Ids may hold control characters that no header value can carry.
fn last_event_id_header(id: &str) -> EventSourceResult<HeaderValue> {
    Ok(HeaderValue::from_str(id)?)
}

/// Await `future`, giving up after `limit` when one is set.
async fn bounded<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output, Elapsed> {
    match limit {
        Some(duration) => timeout(duration, future).await,
        None => Ok(future.await),
    }
}
