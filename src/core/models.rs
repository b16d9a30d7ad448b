// src/core/models.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

// --- Targets ---

/// A URL ready to be probed, paired with its registrable hostname.
///
/// Built by `ProbeTarget::parse` (see `core::target`); never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub(crate) url: Url,
    pub(crate) hostname: String,
}

impl ProbeTarget {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }
}

/// Caller-controlled switches for a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOptions {
    pub fetch_resources: bool,
    pub resource_limit: usize,
    pub check_advanced: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self { fetch_resources: true, resource_limit: 20, check_advanced: true }
    }
}

// --- Measurements ---

/// Stage durations in milliseconds. `None` means the stage was not measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingResult {
    pub dns_ms: Option<f64>,
    pub tcp_ms: Option<f64>,
    pub tls_ms: Option<f64>,
    pub ttfb_ms: Option<f64>,
    pub total_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsAssessment {
    pub valid: bool,
    pub days_remaining: Option<i64>,
    pub issuer: Option<String>,
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub score: u8,
    pub breakdown: BTreeMap<String, u8>,
}

impl TlsAssessment {
    /// The state reported when inspection could not complete.
    pub fn failed() -> Self {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("Error".to_string(), 0);
        Self { breakdown, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityHeaderAssessment {
    pub score: u8,
    pub present: BTreeMap<String, String>,
    pub missing: Vec<String>,
}

/// Sub-resource totals in kilobytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBreakdown {
    pub images_kb: f64,
    pub scripts_kb: f64,
    pub css_kb: f64,
}

/// Raw numbers behind the connection-reuse benefit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReuse {
    pub first_request_ms: f64,
    pub subsequent_avg_ms: f64,
    pub benefit_ms: f64,
}

/// Latency per public resolver; `None` when that resolver failed.
pub type DnsBreakdown = BTreeMap<String, Option<f64>>;

// --- Report ---

pub const NO_CDN: &str = "None detected";
pub const NO_COMPRESSION: &str = "None";
pub const UNKNOWN: &str = "Unknown";

/// Everything learned about one target. Built once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteReport {
    pub url: String,
    pub ip: Option<String>,
    pub probed_at: DateTime<Utc>,
    pub timing: TimingResult,
    pub size_kb: Option<f64>,
    pub status_code: Option<u16>,
    pub tls: TlsAssessment,
    pub http_version: Option<String>,
    pub cdn_provider: Option<String>,
    pub compression: Option<String>,
    pub security_headers: Option<SecurityHeaderAssessment>,
    pub server_location: Option<String>,
    pub connection_reuse_benefit: Option<f64>,
    pub dns_breakdown: Option<DnsBreakdown>,
    pub resources: Option<ResourceBreakdown>,
}

impl SiteReport {
    /// An empty report for `url`: every measurement absent, TLS score 0.
    pub fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ip: None,
            probed_at: Utc::now(),
            timing: TimingResult::default(),
            size_kb: None,
            status_code: None,
            tls: TlsAssessment::default(),
            http_version: None,
            cdn_provider: None,
            compression: None,
            security_headers: None,
            server_location: None,
            connection_reuse_benefit: None,
            dns_breakdown: None,
            resources: None,
        }
    }
}

/// Rounds a millisecond/kilobyte figure to two decimals.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Truncates to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
