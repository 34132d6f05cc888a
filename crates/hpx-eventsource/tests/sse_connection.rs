//! Integration tests for SSE connections over real HTTP.
//!
//! Uses a mock hyper HTTP server to serve event streams, verifying the full
//! request → parse → event pipeline through the default reqwest transport.

#![cfg(feature = "reqwest")]

use std::{
    collections::VecDeque,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use hpx_eventsource::{MessageEvent, SseConfig, SseConnection, SseEvent, SseStream, StreamFailure};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::{
    Request, Response,
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, time::timeout};

// ---------------------------------------------------------------------------
// Mock SSE server helpers
// ---------------------------------------------------------------------------

/// A canned response, handed out to requests in order.
struct MockResponse {
    status: u16,
    location: Option<&'static str>,
    body: &'static str,
}

impl MockResponse {
    fn ok(body: &'static str) -> Self {
        Self {
            status: 200,
            location: None,
            body,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            location: None,
            body: "",
        }
    }

    fn redirect(status: u16, location: &'static str) -> Self {
        Self {
            status,
            location: Some(location),
            body: "",
        }
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        let mut builder = Response::builder()
            .status(self.status)
            .header("content-type", "text/event-stream");
        if let Some(location) = self.location {
            builder = builder.header("location", location);
        }
        builder
            .body(Full::new(Bytes::from(self.body)))
            .expect("build response")
    }
}

/// What the server saw for one request.
#[derive(Clone, Debug)]
struct Recorded {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Start a server that answers each request with the next response, or
    /// `404` once they run out.
    async fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let responses = Arc::new(Mutex::new(VecDeque::from(responses)));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let responses = Arc::clone(&responses);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(
                            TokioIo::new(stream),
                            service_fn(move |req: Request<Incoming>| {
                                let responses = Arc::clone(&responses);
                                let recorded = Arc::clone(&recorded);
                                async move {
                                    let (parts, body) = req.into_parts();
                                    let body = body
                                        .collect()
                                        .await
                                        .map(|collected| collected.to_bytes())
                                        .unwrap_or_default();
                                    recorded.lock().expect("lock requests").push(Recorded {
                                        method: parts.method,
                                        path: parts.uri.path().to_owned(),
                                        headers: parts.headers,
                                        body,
                                    });

                                    let next = responses.lock().expect("lock responses").pop_front();
                                    let resp = next
                                        .unwrap_or_else(|| MockResponse::status(404))
                                        .into_response();
                                    Ok::<_, Infallible>(resp)
                                }
                            }),
                        )
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock requests").clone()
    }
}

async fn next(stream: &mut SseStream) -> SseEvent {
    timeout(Duration::from_secs(5), stream.next_event())
        .await
        .expect("timeout")
        .expect("event")
}

/// Read events until the stream ends.
async fn drain(stream: &mut SseStream) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), stream.next_event())
        .await
        .expect("timeout")
    {
        events.push(event);
    }
    events
}

fn message(event: &str, data: &str, id: &str, origin: &str) -> SseEvent {
    SseEvent::Message(MessageEvent {
        event: event.to_owned(),
        data: data.to_owned(),
        last_event_id: id.to_owned(),
        origin: origin.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Basic connection and event reception
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_basic_sse_connection_and_events() {
    let body = "event: message\ndata: {\"price\":42000}\nid: evt-1\n\nevent: update\ndata: hello\ndata: world\nid: evt-2\n\n";
    let server = MockServer::start(vec![MockResponse::ok(body)]).await;

    let config = SseConfig::new(server.url("/stream"));
    let connection = SseConnection::connect(config).await.expect("connect");
    let (handle, mut stream) = connection.split();

    let origin = server.origin();
    assert_eq!(
        drain(&mut stream).await,
        vec![
            SseEvent::Open,
            message("message", "{\"price\":42000}", "evt-1", &origin),
            message("update", "hello\nworld", "evt-2", &origin),
            SseEvent::End,
            SseEvent::Closed,
        ]
    );
    assert!(handle.is_closed());
    assert_eq!(handle.last_event_id(), "evt-2");
}

// ---------------------------------------------------------------------------
// Status handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sse_non_retryable_status_closes() {
    let server = MockServer::start(vec![MockResponse::status(404)]).await;

    let config = SseConfig::new(server.url("/stream"));
    let connection = SseConnection::connect(config).await.expect("connect");
    let (_handle, mut stream) = connection.split();

    assert_eq!(
        drain(&mut stream).await,
        vec![
            SseEvent::Error(StreamFailure::status(StatusCode::NOT_FOUND)),
            SseEvent::Closed,
        ]
    );
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_sse_retryable_status_reconnects() {
    let server = MockServer::start(vec![
        MockResponse::status(503),
        MockResponse::ok("data: recovered\n\n"),
    ])
    .await;

    let config =
        SseConfig::new(server.url("/stream")).initial_retry_delay(Duration::from_millis(10));
    let connection = SseConnection::connect(config).await.expect("connect");
    let (_handle, mut stream) = connection.split();

    assert_eq!(
        drain(&mut stream).await,
        vec![
            SseEvent::Error(StreamFailure::status(StatusCode::SERVICE_UNAVAILABLE)),
            SseEvent::Retrying {
                delay: Duration::from_millis(10)
            },
            SseEvent::Open,
            message("message", "recovered", "", &server.origin()),
            SseEvent::End,
            SseEvent::Closed,
        ]
    );
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sse_default_and_custom_headers() {
    let server = MockServer::start(vec![MockResponse::ok("")]).await;

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_static("secret"));
    let config = SseConfig::new(server.url("/stream")).headers(headers);
    let connection = SseConnection::connect(config).await.expect("connect");
    let (_handle, mut stream) = connection.split();
    drain(&mut stream).await;

    let requests = server.requests();
    let headers = &requests[0].headers;
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(headers["accept"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-api-key"], "secret");
    assert!(headers.get("last-event-id").is_none());
}

#[tokio::test]
async fn test_sse_skip_default_headers() {
    let server = MockServer::start(vec![MockResponse::ok("")]).await;

    let config = SseConfig::new(server.url("/stream")).skip_default_headers(true);
    let connection = SseConnection::connect(config).await.expect("connect");
    let (_handle, mut stream) = connection.split();
    drain(&mut stream).await;

    let requests = server.requests();
    assert!(requests[0].headers.get("cache-control").is_none());
    assert_ne!(
        requests[0].headers.get("accept").map(HeaderValue::as_bytes),
        Some(b"text/event-stream".as_slice())
    );
}

#[tokio::test]
async fn test_sse_post_with_body() {
    let server = MockServer::start(vec![MockResponse::ok("data: ok\n\n")]).await;

    let config = SseConfig::new(server.url("/subscribe"))
        .method(Method::POST)
        .body(r#"{"channels":["trades"]}"#);
    let connection = SseConnection::connect(config).await.expect("connect");
    let (_handle, mut stream) = connection.split();
    drain(&mut stream).await;

    let requests = server.requests();
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path, "/subscribe");
    assert_eq!(requests[0].body, Bytes::from_static(br#"{"channels":["trades"]}"#));
}

// ---------------------------------------------------------------------------
// Resumption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sse_last_event_id_sent_on_reconnect() {
    let server = MockServer::start(vec![
        MockResponse::ok("retry: 20\nid: 7\ndata: a\n\n"),
        MockResponse::ok("data: b\n\n"),
    ])
    .await;

    let mut headers = HeaderMap::new();
    headers.insert("last-event-id", HeaderValue::from_static("6"));
    let config = SseConfig::new(server.url("/stream"))
        .headers(headers)
        .error_filter(|failure| failure.is_end());
    let connection = SseConnection::connect(config).await.expect("connect");
    let (handle, mut stream) = connection.split();

    let origin = server.origin();
    assert_eq!(next(&mut stream).await, SseEvent::Open);
    assert_eq!(next(&mut stream).await, message("message", "a", "7", &origin));
    assert_eq!(next(&mut stream).await, SseEvent::End);
    assert_eq!(
        next(&mut stream).await,
        SseEvent::Retrying {
            delay: Duration::from_millis(20)
        }
    );
    assert_eq!(next(&mut stream).await, SseEvent::Open);
    assert_eq!(next(&mut stream).await, message("message", "b", "7", &origin));
    assert_eq!(handle.reconnect_interval(), Duration::from_millis(20));

    handle.close();
    let rest = drain(&mut stream).await;
    assert_eq!(rest.iter().filter(|e| e.is_closed()).count(), 1);
    assert_eq!(rest.last(), Some(&SseEvent::Closed));

    let requests = server.requests();
    assert_eq!(requests[0].headers["last-event-id"], "6");
    assert_eq!(requests[1].headers["last-event-id"], "7");
}

// ---------------------------------------------------------------------------
// Redirects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sse_follows_relative_redirect() {
    let server = MockServer::start(vec![
        MockResponse::redirect(307, "/moved"),
        MockResponse::ok("data: hi\n\n"),
    ])
    .await;

    let config = SseConfig::new(server.url("/start"));
    let connection = SseConnection::connect(config).await.expect("connect");
    let (_handle, mut stream) = connection.split();

    assert_eq!(
        drain(&mut stream).await,
        vec![
            SseEvent::Open,
            message("message", "hi", "", &server.origin()),
            SseEvent::End,
            SseEvent::Closed,
        ]
    );
    let paths: Vec<_> = server.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, ["/start", "/moved"]);
}

// ---------------------------------------------------------------------------
// Graceful close via SseHandle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sse_handle_close_is_idempotent() {
    let server = MockServer::start(vec![MockResponse::status(503)]).await;

    // Long delay so the close lands while a reconnect is pending.
    let config = SseConfig::new(server.url("/stream")).initial_retry_delay(Duration::from_secs(60));
    let connection = SseConnection::connect(config).await.expect("connect");
    let (handle, mut stream) = connection.split();

    assert!(matches!(next(&mut stream).await, SseEvent::Error(_)));
    assert!(matches!(next(&mut stream).await, SseEvent::Retrying { .. }));

    handle.close();
    handle.close();
    assert_eq!(drain(&mut stream).await, vec![SseEvent::Closed]);

    timeout(Duration::from_secs(1), handle.closed())
        .await
        .expect("closed");
    handle.close();
    assert_eq!(server.requests().len(), 1);
}
