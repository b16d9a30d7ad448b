// src/core/report.rs

//! Shapes a `SiteReport` for the collaborators downstream of the engine: a
//! flat record for storage and a handful of display lines for rendering.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::SiteReport;

/// One row per probed target, every nested field spread out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
    pub dns_ms: Option<f64>,
    pub tcp_ms: Option<f64>,
    pub ssl_ms: Option<f64>,
    pub ttfb_ms: Option<f64>,
    pub total_ms: Option<f64>,
    pub size_kb: Option<f64>,
    pub status_code: Option<u16>,
    pub images_kb: Option<f64>,
    pub scripts_kb: Option<f64>,
    pub css_kb: Option<f64>,
    pub ssl_score: u8,
    pub ssl_valid: bool,
    pub ssl_days_remaining: Option<i64>,
    pub ssl_issuer: Option<String>,
    pub ssl_version: Option<String>,
    pub ssl_cipher: Option<String>,
    pub ssl_score_breakdown: BTreeMap<String, u8>,
    pub http_version: Option<String>,
    pub cdn_provider: Option<String>,
    pub compression_type: Option<String>,
    pub security_headers_score: Option<u8>,
    pub security_headers_present: Option<BTreeMap<String, String>>,
    pub security_headers_missing: Option<Vec<String>>,
    pub server_location: Option<String>,
    pub connection_reuse_benefit: Option<f64>,
    pub dns_breakdown: Option<BTreeMap<String, Option<f64>>>,
}

impl From<&SiteReport> for FlatRecord {
    fn from(report: &SiteReport) -> Self {
        let headers = report.security_headers.as_ref();
        Self {
            url: report.url.clone(),
            timestamp: report.probed_at,
            ip: report.ip.clone(),
            dns_ms: report.timing.dns_ms,
            tcp_ms: report.timing.tcp_ms,
            ssl_ms: report.timing.tls_ms,
            ttfb_ms: report.timing.ttfb_ms,
            total_ms: report.timing.total_ms,
            size_kb: report.size_kb,
            status_code: report.status_code,
            images_kb: report.resources.map(|r| r.images_kb),
            scripts_kb: report.resources.map(|r| r.scripts_kb),
            css_kb: report.resources.map(|r| r.css_kb),
            ssl_score: report.tls.score,
            ssl_valid: report.tls.valid,
            ssl_days_remaining: report.tls.days_remaining,
            ssl_issuer: report.tls.issuer.clone(),
            ssl_version: report.tls.protocol.clone(),
            ssl_cipher: report.tls.cipher.clone(),
            ssl_score_breakdown: report.tls.breakdown.clone(),
            http_version: report.http_version.clone(),
            cdn_provider: report.cdn_provider.clone(),
            compression_type: report.compression.clone(),
            security_headers_score: headers.map(|h| h.score),
            security_headers_present: headers.map(|h| h.present.clone()),
            security_headers_missing: headers.map(|h| h.missing.clone()),
            server_location: report.server_location.clone(),
            connection_reuse_benefit: report.connection_reuse_benefit,
            dns_breakdown: report.dns_breakdown.clone(),
        }
    }
}

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

impl SiteReport {
    pub fn to_flat_record(&self) -> FlatRecord {
        FlatRecord::from(self)
    }

    /// The summary lines a report renderer prints for this target.
    pub fn display_lines(&self) -> Vec<String> {
        vec![
            format!("URL: {}", self.url),
            format!(
                "IP: {}   Status: {}   Location: {}",
                or_na(self.ip.as_deref()),
                or_na(self.status_code),
                or_na(self.server_location.as_deref())
            ),
            format!(
                "DNS: {} ms, TCP: {} ms, SSL: {} ms",
                or_na(self.timing.dns_ms),
                or_na(self.timing.tcp_ms),
                or_na(self.timing.tls_ms)
            ),
            format!(
                "TTFB: {} ms, Total: {} ms, Size: {} KB",
                or_na(self.timing.ttfb_ms),
                or_na(self.timing.total_ms),
                or_na(self.size_kb)
            ),
            format!(
                "HTTP: {}, CDN: {}, Compression: {}",
                or_na(self.http_version.as_deref()),
                or_na(self.cdn_provider.as_deref()),
                or_na(self.compression.as_deref())
            ),
            format!(
                "SSL Score: {}/100, Security Headers: {}/100",
                self.tls.score,
                self.security_headers.as_ref().map(|h| h.score).unwrap_or(0)
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ResourceBreakdown, SecurityHeaderAssessment};

    fn sample() -> SiteReport {
        let mut report = SiteReport::empty("https://example.com/");
        report.ip = Some("93.184.216.34".to_string());
        report.status_code = Some(200);
        report.timing.dns_ms = Some(12.5);
        report.timing.ttfb_ms = Some(80.0);
        report.cdn_provider = Some("Cloudflare".to_string());
        report.security_headers = Some(SecurityHeaderAssessment { score: 35, ..Default::default() });
        report.resources = Some(ResourceBreakdown { images_kb: 10.5, scripts_kb: 3.0, css_kb: 1.25 });
        report
    }

    #[test]
    fn flat_record_spreads_nested_fields() {
        let record = sample().to_flat_record();
        assert_eq!(record.ip.as_deref(), Some("93.184.216.34"));
        assert_eq!(record.images_kb, Some(10.5));
        assert_eq!(record.css_kb, Some(1.25));
        assert_eq!(record.security_headers_score, Some(35));
        assert_eq!(record.ssl_score, 0);
        assert!(record.ssl_issuer.is_none());

        let json = serde_json::to_value(&record).expect("serializes");
        assert_eq!(json["status_code"], 200);
        assert!(json["tcp_ms"].is_null());
    }

    #[test]
    fn plain_http_record_has_null_tls_fields() {
        let record = SiteReport::empty("http://example.com/").to_flat_record();
        assert_eq!(record.ssl_score, 0);
        assert!(!record.ssl_valid);
        assert!(record.ssl_days_remaining.is_none());
        assert!(record.ssl_version.is_none());
        assert!(record.ssl_cipher.is_none());
    }

    #[test]
    fn display_lines_mark_missing_values() {
        let lines = sample().display_lines();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "URL: https://example.com/");
        assert_eq!(lines[1], "IP: 93.184.216.34   Status: 200   Location: N/A");
        assert_eq!(lines[2], "DNS: 12.5 ms, TCP: N/A ms, SSL: N/A ms");
        assert_eq!(lines[5], "SSL Score: 0/100, Security Headers: 35/100");
    }
}
