//! The HTTP boundary used by [`SseConnection`](crate::SseConnection).
//!
//! A transport issues exactly one request per call and hands back the status,
//! headers and a body stream. Redirects are not followed: the connection
//! interprets `301`/`307` itself. Dropping the returned future or the body
//! stream must abort the request.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::EventSourceResult;

#[cfg(feature = "reqwest")]
pub mod reqwest;

/// A single SSE request.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// Target URL.
    pub url: Url,
    /// `GET` or `POST`.
    pub method: Method,
    /// Full header set, defaults and `Last-Event-ID` included.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Bytes>,
    /// Whether credentials accompany cross-origin requests.
    pub with_credentials: bool,
}

/// Response head plus a stream of body chunks.
pub struct TransportResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body chunks. An `Err` item ends the stream abruptly.
    pub body: BoxStream<'static, EventSourceResult<Bytes>>,
}

impl TransportResponse {
    /// Create a response.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: BoxStream<'static, EventSourceResult<Bytes>>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Issues SSE requests.
#[async_trait]
pub trait SseTransport: Send + Sync + 'static {
    /// Send a request and return the response head once it arrives.
    async fn send(&self, request: TransportRequest) -> EventSourceResult<TransportResponse>;
}

#[async_trait]
impl<T: SseTransport + ?Sized> SseTransport for Arc<T> {
    async fn send(&self, request: TransportRequest) -> EventSourceResult<TransportResponse> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: SseTransport + ?Sized> SseTransport for Box<T> {
    async fn send(&self, request: TransportRequest) -> EventSourceResult<TransportResponse> {
        (**self).send(request).await
    }
}
