// src/core/scanner/transport/coarse.rs

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, redirect};
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::{FetchOutcome, FetchTiming, Transport, elapsed_ms, kilobytes};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, Result};

/// reqwest-backed transport. Reports TTFB and total only: the connection
/// pool hides where connect and handshake time go.
pub struct CoarseTransport {
    client: Client,
    limit: std::time::Duration,
}

impl CoarseTransport {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, limit: config.fetch_timeout() })
    }

    async fn fetch_inner(&self, url: &Url) -> Result<FetchOutcome> {
        let start = Instant::now();
        let response = self.client.get(url.clone()).send().await.map_err(ProbeError::transport)?;
        let ttfb_ms = elapsed_ms(start);

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let version = response.version();
        let final_url = response.url().clone();
        let body = response.bytes().await.map_err(ProbeError::transport)?;
        let total_ms = elapsed_ms(start);

        debug!(url = %url, status, bytes = body.len(), "Coarse fetch completed.");
        Ok(FetchOutcome {
            final_url,
            status,
            headers,
            version: Some(version),
            size_kb: kilobytes(body.len()),
            body: String::from_utf8_lossy(&body).into_owned(),
            timing: FetchTiming { tcp_ms: None, tls_ms: None, ttfb_ms, total_ms },
        })
    }
}

#[async_trait]
impl Transport for CoarseTransport {
    fn name(&self) -> &'static str {
        "coarse"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome> {
        info!(url = %url, "Fetching with coarse transport.");
        timeout(self.limit, self.fetch_inner(url))
            .await
            .map_err(|_| ProbeError::Transport(format!("fetch timed out after {:?}", self.limit)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reports_status_size_and_coarse_timings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let transport = CoarseTransport::new(&ProbeConfig::default()).expect("client");
        let url = Url::parse(&server.uri()).expect("url");
        let outcome = transport.fetch(&url).await.expect("fetch succeeds");

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.size_kb, 2.0);
        assert!(outcome.timing.tcp_ms.is_none());
        assert!(outcome.timing.tls_ms.is_none());
        assert!(outcome.timing.total_ms >= outcome.timing.ttfb_ms);
    }

    #[tokio::test]
    async fn follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let transport = CoarseTransport::new(&ProbeConfig::default()).expect("client");
        let url = Url::parse(&format!("{}/old", server.uri())).expect("url");
        let outcome = transport.fetch(&url).await.expect("fetch succeeds");
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.final_url.path(), "/new");
        assert_eq!(outcome.body, "moved");
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_error() {
        let transport = CoarseTransport::new(&ProbeConfig::default()).expect("client");
        let url = Url::parse("http://127.0.0.1:9/").expect("url");
        assert!(matches!(transport.fetch(&url).await, Err(ProbeError::Transport(_))));
    }
}
