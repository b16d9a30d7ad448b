// src/core/scanner/ssl_scanner.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ProtocolVersion, RootCertStore};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use x509_parser::prelude::*;

use crate::core::models::{TlsAssessment, truncate_chars};
use crate::error::{ProbeError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// What a single TLS connection revealed before scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsObservation {
    pub days_remaining: Option<i64>,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub protocol: Option<String>,
    pub cipher: Option<String>,
}

/// The Mozilla root set bundled by `webpki-roots`.
pub(crate) fn web_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Builds the rustls client configuration shared by the inspector and the
/// instrumented transport.
pub(crate) fn client_config(roots: RootCertStore, alpn: &[&[u8]]) -> Result<Arc<ClientConfig>> {
    let mut config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Config(format!("TLS configuration: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(Arc::new(config))
}

/// SNI name for `hostname`; bracketed IPv6 literals are accepted.
pub(crate) fn server_name(hostname: &str) -> Result<ServerName<'static>> {
    let hostname = hostname.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(hostname.to_string())
        .map_err(|_| ProbeError::certificate(format!("invalid DNS name: {}", hostname)))
}

/// Inspects the certificate served on `hostname:443` and scores it.
///
/// Any failure (connect, handshake, missing or unparsable certificate,
/// timeout) produces `TlsAssessment::failed()` instead of an error.
pub async fn run_ssl_scan(hostname: &str, limit: Duration) -> TlsAssessment {
    info!(hostname, "Starting TLS inspection.");
    let tls = match client_config(web_roots(), &[]) {
        Ok(tls) => tls,
        Err(e) => {
            warn!(hostname, error = %e, "TLS inspection could not start.");
            return TlsAssessment::failed();
        }
    };
    let observation = match timeout(limit, inspect(tls, hostname, 443)).await {
        Ok(Ok(observation)) => observation,
        Ok(Err(e)) => {
            warn!(hostname, error = %e, "TLS inspection failed.");
            return TlsAssessment::failed();
        }
        Err(_) => {
            warn!(hostname, ?limit, "TLS inspection timed out.");
            return TlsAssessment::failed();
        }
    };

    let assessment = assess(&observation);
    info!(hostname, score = assessment.score, valid = assessment.valid, "TLS inspection finished.");
    assessment
}

async fn inspect(tls: Arc<ClientConfig>, hostname: &str, port: u16) -> Result<TlsObservation> {
    let connector = TlsConnector::from(tls);
    let name = server_name(hostname)?;

    debug!(hostname, port, "Connecting TCP stream.");
    let stream = TcpStream::connect((hostname, port))
        .await
        .map_err(|e| ProbeError::certificate(format!("TCP connection error: {}", e)))?;

    debug!(hostname, "Performing TLS handshake.");
    let tls = connector
        .connect(name, stream)
        .await
        .map_err(|e| ProbeError::certificate(format!("TLS handshake error: {}", e)))?;
    let (_, session) = tls.get_ref();

    let protocol = session.protocol_version().map(protocol_name);
    let cipher = session
        .negotiated_cipher_suite()
        .map(|suite| truncate_chars(&format!("{:?}", suite.suite()), 50));

    let leaf = session
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| ProbeError::certificate("server did not provide a certificate"))?;
    let (_, x509) = parse_x509_certificate(leaf.as_ref())
        .map_err(|e| ProbeError::certificate(format!("X.509 parse error: {}", e)))?;

    let not_after = x509.validity().not_after.timestamp();
    let days_remaining = days_until(not_after, Utc::now().timestamp());
    let issuer = first_common_name(x509.issuer()).unwrap_or_else(|| "Unknown".to_string());
    let subject = first_common_name(x509.subject());

    debug!(hostname, issuer = %issuer, ?subject, days_remaining, ?protocol, ?cipher, "Parsed peer certificate.");
    Ok(TlsObservation {
        days_remaining: Some(days_remaining),
        issuer: Some(truncate_chars(&issuer, 50)),
        subject,
        protocol,
        cipher,
    })
}

fn first_common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

/// Whole days between two Unix timestamps, floored like calendar subtraction.
fn days_until(not_after: i64, now: i64) -> i64 {
    (not_after - now).div_euclid(SECONDS_PER_DAY)
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1".to_string(),
        other => format!("{:?}", other),
    }
}

/// Scores an observation. Pure: the same triple always yields the same score.
pub fn assess(observation: &TlsObservation) -> TlsAssessment {
    let valid = observation.days_remaining.is_some_and(|days| days > 0);
    let mut breakdown = BTreeMap::new();

    let validity_points = if valid { 40 } else { 0 };
    breakdown.insert("Valid Certificate".to_string(), validity_points);

    let (expiry_label, expiry_points) = match observation.days_remaining {
        Some(days) if days > 90 => ("Certificate Expiry (>90 days)", 30),
        Some(days) if days > 30 => ("Certificate Expiry (30-90 days)", 20),
        Some(days) if days > 0 => ("Certificate Expiry (<30 days)", 10),
        Some(days) if days < 0 => ("Certificate Expiry (Expired)", 0),
        // Expiring today is reported without a tier.
        Some(_) | None => ("Certificate Expiry", 0),
    };
    breakdown.insert(expiry_label.to_string(), expiry_points);

    let (protocol_label, protocol_points) = match observation.protocol.as_deref() {
        Some("TLSv1.3") => ("TLS Version (1.3)".to_string(), 20),
        Some("TLSv1.2") => ("TLS Version (1.2)".to_string(), 15),
        Some("TLSv1.1") => ("TLS Version (1.1)".to_string(), 5),
        Some(other) => (format!("TLS Version ({})", other), 0),
        None => ("TLS Version".to_string(), 0),
    };
    breakdown.insert(protocol_label, protocol_points);

    let (cipher_label, cipher_points) = match observation.cipher.as_deref().filter(|c| !c.is_empty()) {
        Some(cipher) => cipher_strength(cipher),
        None => ("Cipher Strength", 0),
    };
    breakdown.insert(cipher_label.to_string(), cipher_points);

    let total: u32 = breakdown.values().map(|points| u32::from(*points)).sum();
    TlsAssessment {
        valid,
        days_remaining: observation.days_remaining,
        issuer: observation.issuer.clone(),
        protocol: observation.protocol.clone(),
        cipher: observation.cipher.clone(),
        score: total.min(100) as u8,
        breakdown,
    }
}

fn cipher_strength(cipher: &str) -> (&'static str, u8) {
    let upper = cipher.to_uppercase();
    if ["AES_256", "AES256", "CHACHA20"].iter().any(|m| upper.contains(m)) {
        ("Cipher Strength (Strong)", 10)
    } else if ["AES_128", "AES128"].iter().any(|m| upper.contains(m)) {
        ("Cipher Strength (Good)", 7)
    } else if upper.contains("AES") {
        ("Cipher Strength (Moderate)", 5)
    } else {
        ("Cipher Strength (Weak)", 0)
    }
}
