// src/core/scanner/transport/instrumented.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::header::{ACCEPT, HOST, LOCATION, USER_AGENT};
use hyper_util::rt::TokioIo;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};
use url::{Position, Url};

use super::{FetchOutcome, FetchTiming, Transport, elapsed_ms, kilobytes};
use crate::config::ProbeConfig;
use crate::core::scanner::ssl_scanner::{client_config, server_name, web_roots};
use crate::error::{ProbeError, Result};

/// Transport that owns its sockets so it can time each phase: TCP connect,
/// TLS handshake, first response byte, end of body.
///
/// Speaks HTTP/1.1 over a fresh connection per hop. Connect and handshake
/// timings are those of the final hop; TTFB and total run from the start of
/// the fetch, redirects included.
pub struct InstrumentedTransport {
    tls: Arc<ClientConfig>,
    user_agent: String,
    max_redirects: usize,
    limit: Duration,
}

/// Measurements of a single request/response exchange.
struct Hop {
    response: hyper::Response<Incoming>,
    tcp_ms: f64,
    tls_ms: Option<f64>,
    ttfb_ms: f64,
}

impl InstrumentedTransport {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        Self::with_roots(config, web_roots())
    }

    /// Same as `new`, trusting `roots` instead of the bundled root set.
    pub(crate) fn with_roots(config: &ProbeConfig, roots: RootCertStore) -> Result<Self> {
        Ok(Self {
            tls: client_config(roots, &[b"http/1.1"])?,
            user_agent: config.user_agent.clone(),
            max_redirects: config.max_redirects,
            limit: config.fetch_timeout(),
        })
    }

    async fn fetch_inner(&self, url: &Url) -> Result<FetchOutcome> {
        let start = Instant::now();
        let mut current = url.clone();
        let mut redirects = 0;

        loop {
            let hop = self.request_once(&current, start).await?;
            let status = hop.response.status();

            if status.is_redirection() {
                if let Some(location) = hop.response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                    if redirects >= self.max_redirects {
                        return Err(ProbeError::Transport(format!("too many redirects (>{})", self.max_redirects)));
                    }
                    let next = current.join(location).map_err(ProbeError::transport)?;
                    debug!(from = %current, to = %next, status = status.as_u16(), "Following redirect.");
                    current = next;
                    redirects += 1;
                    continue;
                }
            }

            let headers = hop.response.headers().clone();
            let version = hop.response.version();
            let body = hop
                .response
                .into_body()
                .collect()
                .await
                .map_err(ProbeError::transport)?
                .to_bytes();
            let total_ms = elapsed_ms(start);

            debug!(url = %current, status = status.as_u16(), bytes = body.len(), redirects, "Instrumented fetch completed.");
            return Ok(FetchOutcome {
                final_url: current,
                status: status.as_u16(),
                headers,
                version: Some(version),
                size_kb: kilobytes(body.len()),
                body: String::from_utf8_lossy(&body).into_owned(),
                timing: FetchTiming { tcp_ms: Some(hop.tcp_ms), tls_ms: hop.tls_ms, ttfb_ms: hop.ttfb_ms, total_ms },
            });
        }
    }

    async fn request_once(&self, url: &Url, start: Instant) -> Result<Hop> {
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::Transport(format!("URL has no host: {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::Transport(format!("unsupported scheme: {}", url.scheme())))?;
        let addr = resolve(host, port).await?;

        let connect_start = Instant::now();
        let tcp = TcpStream::connect(addr).await.map_err(ProbeError::transport)?;
        let tcp_ms = elapsed_ms(connect_start);

        match url.scheme() {
            "https" => {
                let name = server_name(host)?;
                let handshake_start = Instant::now();
                let tls = TlsConnector::from(self.tls.clone())
                    .connect(name, tcp)
                    .await
                    .map_err(|e| ProbeError::Transport(format!("TLS handshake error: {}", e)))?;
                let tls_ms = elapsed_ms(handshake_start);
                let response = self.exchange(tls, url).await?;
                Ok(Hop { response, tcp_ms, tls_ms: Some(tls_ms), ttfb_ms: elapsed_ms(start) })
            }
            "http" => {
                let response = self.exchange(tcp, url).await?;
                Ok(Hop { response, tcp_ms, tls_ms: None, ttfb_ms: elapsed_ms(start) })
            }
            other => Err(ProbeError::Transport(format!("unsupported scheme: {}", other))),
        }
    }

    /// Sends one GET over `stream` and waits for the response head.
    async fn exchange<S>(&self, stream: S, url: &Url) -> Result<hyper::Response<Incoming>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(ProbeError::transport)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Instrumented connection closed with error.");
            }
        });

        let path = match &url[Position::BeforePath..Position::AfterQuery] {
            "" => "/",
            path => path,
        };
        let authority = &url[Position::BeforeHost..Position::AfterPort];
        let request = Request::get(path)
            .header(HOST, authority)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, "*/*")
            .body(Empty::<Bytes>::new())
            .map_err(ProbeError::transport)?;

        sender.send_request(request).await.map_err(ProbeError::transport)
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await.map_err(ProbeError::transport)?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ProbeError::Transport(format!("no addresses for {}", host)))
}

#[async_trait]
impl Transport for InstrumentedTransport {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome> {
        info!(url = %url, "Fetching with instrumented transport.");
        timeout(self.limit, self.fetch_inner(url))
            .await
            .map_err(|_| ProbeError::Transport(format!("fetch timed out after {:?}", self.limit)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::test_tls::{TEST_BODY, spawn_https_server};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reports_tcp_timing_for_plain_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "probe-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("y".repeat(3072)))
            .mount(&server)
            .await;

        let mut config = ProbeConfig::default();
        config.user_agent = "probe-test".to_string();
        let transport = InstrumentedTransport::new(&config).expect("transport");
        let url = Url::parse(&format!("{}/page", server.uri())).expect("url");
        let outcome = transport.fetch(&url).await.expect("fetch succeeds");

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.size_kb, 3.0);
        assert!(outcome.timing.tcp_ms.is_some());
        assert!(outcome.timing.tls_ms.is_none());
        assert!(outcome.timing.total_ms >= outcome.timing.ttfb_ms);
        assert_eq!(outcome.version, Some(reqwest::Version::HTTP_11));
    }

    #[tokio::test]
    async fn reports_tcp_and_tls_timing_for_https() {
        let server = spawn_https_server(60).await;
        let transport = InstrumentedTransport::with_roots(&ProbeConfig::default(), server.roots.clone())
            .expect("transport");

        for host in ["localhost", "127.0.0.1"] {
            let url = Url::parse(&format!("https://{}:{}/secure", host, server.addr.port())).expect("url");
            let outcome = transport.fetch(&url).await.expect("https fetch succeeds");

            assert_eq!(outcome.status, 200);
            assert_eq!(outcome.body, TEST_BODY);
            assert!(outcome.timing.tcp_ms.is_some_and(|ms| ms >= 0.0));
            assert!(outcome.timing.tls_ms.is_some_and(|ms| ms >= 0.0));
            assert!(outcome.timing.ttfb_ms >= outcome.timing.tls_ms.unwrap_or_default());
            assert_eq!(outcome.version, Some(reqwest::Version::HTTP_11));
        }
    }

    #[tokio::test]
    async fn untrusted_https_server_is_a_transport_error() {
        let server = spawn_https_server(60).await;
        let transport = InstrumentedTransport::new(&ProbeConfig::default()).expect("transport");
        let url = Url::parse(&format!("https://localhost:{}/", server.addr.port())).expect("url");
        assert!(matches!(transport.fetch(&url).await, Err(ProbeError::Transport(_))));
    }

    #[tokio::test]
    async fn follows_relative_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/landing?x=1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/landing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
            .mount(&server)
            .await;

        let transport = InstrumentedTransport::new(&ProbeConfig::default()).expect("transport");
        let url = Url::parse(&format!("{}/start", server.uri())).expect("url");
        let outcome = transport.fetch(&url).await.expect("fetch succeeds");
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, "landed");
        assert_eq!(outcome.final_url.query(), Some("x=1"));
    }

    #[tokio::test]
    async fn redirect_loops_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let mut config = ProbeConfig::default();
        config.max_redirects = 3;
        let transport = InstrumentedTransport::new(&config).expect("transport");
        let url = Url::parse(&format!("{}/loop", server.uri())).expect("url");
        assert!(matches!(transport.fetch(&url).await, Err(ProbeError::Transport(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let transport = InstrumentedTransport::new(&ProbeConfig::default()).expect("transport");
        let url = Url::parse("http://127.0.0.1:9/").expect("url");
        assert!(transport.fetch(&url).await.is_err());
    }
}
