//! [`SseTransport`] backed by [`reqwest::Client`](::reqwest::Client).

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};

use super::{SseTransport, TransportRequest, TransportResponse};
use crate::{
    config::SseConfig,
    error::{EventSourceError, EventSourceResult},
};

/// The default transport.
///
/// Redirects are disabled on the client so the connection can apply its own
/// permanent/temporary redirect rules.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from the proxy, TLS and timeout options of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL or a root certificate is invalid, or
    /// the client cannot be built.
    pub fn from_config(config: &SseConfig) -> EventSourceResult<Self> {
        let mut builder = ::reqwest::Client::builder()
            .redirect(::reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(proxy) = &config.proxy {
            let proxy = ::reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| EventSourceError::config(format!("Invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        for pem in &config.root_certificates {
            let cert = ::reqwest::Certificate::from_pem(pem)
                .map_err(|e| EventSourceError::config(format!("Invalid root certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| EventSourceError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client, sharing its connection pool.
    ///
    /// The client should not follow redirects itself.
    pub fn with_client(client: ::reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SseTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> EventSourceResult<TransportResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(EventSourceError::from).boxed();

        Ok(TransportResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let config = SseConfig::new("http://localhost/events");
        assert!(ReqwestTransport::from_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = SseConfig::new("http://localhost/events").proxy("http://[::1");
        let err = ReqwestTransport::from_config(&config).expect_err("should fail");
        assert!(matches!(err, EventSourceError::Config { .. }));
    }
}
