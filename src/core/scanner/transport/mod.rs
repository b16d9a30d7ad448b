// src/core/scanner/transport/mod.rs

//! Primary fetch of a target, behind a capability trait so the instrumented
//! transport can be swapped for (or fall back to) the coarse one.

pub mod coarse;
#[cfg(feature = "instrumented")]
pub mod instrumented;

use async_trait::async_trait;
use reqwest::Version;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ProbeConfig, TransportMode};
use crate::error::Result;

/// Durations in milliseconds of one primary fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchTiming {
    pub tcp_ms: Option<f64>,
    pub tls_ms: Option<f64>,
    pub ttfb_ms: f64,
    pub total_ms: f64,
}

/// Everything later stages need from the primary fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub final_url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub version: Option<Version>,
    pub body: String,
    pub size_kb: f64,
    pub timing: FetchTiming,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches `url` once, following redirects.
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome>;
}

/// Tries `primary` and falls back to `fallback` when it fails.
pub struct FallbackTransport {
    primary: Box<dyn Transport>,
    fallback: Box<dyn Transport>,
}

impl FallbackTransport {
    pub fn new(primary: Box<dyn Transport>, fallback: Box<dyn Transport>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn fetch(&self, url: &Url) -> Result<FetchOutcome> {
        match self.primary.fetch(url).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(url = %url, transport = self.primary.name(), error = %e, "Primary transport failed, falling back.");
                self.fallback.fetch(url).await
            }
        }
    }
}

/// Picks the transport chain once, at prober construction.
///
/// Asking for the instrumented transport in a build without it is a
/// configuration error rather than a silently degraded probe.
pub fn transport_from_config(config: &ProbeConfig) -> Result<Box<dyn Transport>> {
    debug!(mode = %config.transport, "Selecting primary transport.");
    let coarse: Box<dyn Transport> = Box::new(coarse::CoarseTransport::new(config)?);
    match config.transport {
        TransportMode::Coarse => Ok(coarse),
        TransportMode::Auto => match instrumented_transport(config) {
            Ok(instrumented) => Ok(Box::new(FallbackTransport::new(instrumented, coarse))),
            Err(e) => {
                debug!(error = %e, "Instrumented transport unavailable, using coarse transport.");
                Ok(coarse)
            }
        },
        TransportMode::Instrumented => instrumented_transport(config),
    }
}

#[cfg(feature = "instrumented")]
fn instrumented_transport(config: &ProbeConfig) -> Result<Box<dyn Transport>> {
    Ok(Box::new(instrumented::InstrumentedTransport::new(config)?))
}

#[cfg(not(feature = "instrumented"))]
fn instrumented_transport(_config: &ProbeConfig) -> Result<Box<dyn Transport>> {
    Err(crate::error::ProbeError::Config(
        "the instrumented transport is not compiled in (enable the `instrumented` feature)".to_string(),
    ))
}

pub(crate) fn kilobytes(bytes: usize) -> f64 {
    crate::core::models::round2(bytes as f64 / 1024.0)
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    crate::core::models::round2(start.elapsed().as_secs_f64() * 1000.0)
}
