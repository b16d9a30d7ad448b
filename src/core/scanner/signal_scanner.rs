// src/core/scanner/signal_scanner.rs

use std::net::IpAddr;
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, HeaderMap, SERVER};
use reqwest::{Client, Version};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::core::models::{ConnectionReuse, NO_CDN, NO_COMPRESSION, UNKNOWN, round2};
use crate::core::scanner::http_client;
use crate::error::{ProbeError, Result};

/// Header indicators checked in order; the first one present decides.
const CDN_INDICATORS: &[(&str, &str)] = &[
    ("cf-ray", "Cloudflare"),
    ("x-amz-cf-id", "AWS CloudFront"),
    ("x-cache", "Fastly/Varnish"),
    ("x-akamai-transformed", "Akamai"),
    ("x-cdn", "Generic CDN"),
    ("via", "Proxy/CDN"),
];

fn lowercase_value(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).to_lowercase())
}

/// Names the HTTP version a transport negotiated.
pub fn detect_http_version(version: Option<Version>) -> String {
    match version {
        None => "HTTP/1.1".to_string(),
        Some(Version::HTTP_10) => "HTTP/1.0".to_string(),
        Some(Version::HTTP_11) => "HTTP/1.1".to_string(),
        Some(Version::HTTP_2) => "HTTP/2.0".to_string(),
        Some(_) => UNKNOWN.to_string(),
    }
}

/// Classifies the CDN in front of a site from its response headers.
pub fn detect_cdn(headers: &HeaderMap) -> String {
    for (header, provider) in CDN_INDICATORS {
        let Some(value) = lowercase_value(headers, *header) else {
            continue;
        };
        let provider = match *header {
            "x-cache" if value.contains("cloudfront") => "AWS CloudFront",
            "via" if value.contains("cloudflare") => "Cloudflare",
            _ => *provider,
        };
        debug!(header, provider, "CDN indicator header matched.");
        return provider.to_string();
    }

    let server = lowercase_value(headers, SERVER).unwrap_or_default();
    if server.contains("cloudflare") {
        "Cloudflare".to_string()
    } else if server.contains("akamai") {
        "Akamai".to_string()
    } else {
        NO_CDN.to_string()
    }
}

/// Requests `url` advertising gzip/deflate/br and reports the chosen encoding.
///
/// The client must not decompress transparently, otherwise the
/// `Content-Encoding` header is stripped before it can be read.
pub async fn check_compression(client: &Client, url: &str, limit: Duration) -> String {
    let response = client
        .get(url)
        .header(ACCEPT_ENCODING, "gzip, deflate, br")
        .timeout(limit)
        .send()
        .await;
    match response {
        Ok(resp) => match resp.headers().get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()) {
            Some(encoding) if !encoding.is_empty() && !encoding.eq_ignore_ascii_case("none") => {
                encoding.to_string()
            }
            _ => NO_COMPRESSION.to_string(),
        },
        Err(e) => {
            warn!(url, error = %e, "Compression check failed.");
            UNKNOWN.to_string()
        }
    }
}

/// Folds three request durations into the reuse figures, clamping at zero.
pub fn reuse_from_samples(samples: [f64; 3]) -> ConnectionReuse {
    let first = samples[0];
    let subsequent_avg = (samples[1] + samples[2]) / 2.0;
    let benefit = round2(first - subsequent_avg);
    ConnectionReuse {
        first_request_ms: round2(first),
        subsequent_avg_ms: round2(subsequent_avg),
        benefit_ms: benefit.max(0.0),
    }
}

/// Issues three sequential GETs on a fresh client and measures how much
/// the later, connection-reusing requests save over the first one.
///
/// The client is built per call so the first request always opens a new
/// connection, whatever the prober's shared pool already holds.
pub async fn check_connection_reuse(config: &ProbeConfig, url: &str) -> Result<ConnectionReuse> {
    let client = http_client(config)?;
    let limit = config.detector_timeout();
    let mut samples = [0.0_f64; 3];
    for sample in samples.iter_mut() {
        let start = Instant::now();
        let response = client
            .get(url)
            .timeout(limit)
            .send()
            .await
            .map_err(|e| ProbeError::detector("connection_reuse", e))?;
        // Drain the body so the connection returns to the pool.
        response.bytes().await.map_err(|e| ProbeError::detector("connection_reuse", e))?;
        *sample = start.elapsed().as_secs_f64() * 1000.0;
    }
    let reuse = reuse_from_samples(samples);
    debug!(url, ?reuse, "Connection reuse measured.");
    Ok(reuse)
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

/// Looks `ip` up in the configured geolocation service.
///
/// Returns `"City, Country"` when the service reports success and `Unknown`
/// in every other case.
pub async fn get_server_location(client: &Client, endpoint: &str, ip: IpAddr, limit: Duration) -> String {
    let url = endpoint.replace("{ip}", &ip.to_string());
    match lookup_location(client, &url, limit).await {
        Ok(location) => {
            info!(%ip, location = %location, "Geolocation lookup finished.");
            location
        }
        Err(e) => {
            warn!(%ip, error = %e, "Geolocation lookup failed.");
            UNKNOWN.to_string()
        }
    }
}

async fn lookup_location(client: &Client, url: &str, limit: Duration) -> Result<String> {
    let geo: GeoResponse = client
        .get(url)
        .timeout(limit)
        .send()
        .await
        .map_err(|e| ProbeError::detector("geolocation", e))?
        .json()
        .await
        .map_err(|e| ProbeError::detector("geolocation", e))?;

    if geo.status.as_deref() != Some("success") {
        return Err(ProbeError::detector("geolocation", format!("service status {:?}", geo.status)));
    }
    Ok(format!(
        "{}, {}",
        geo.city.unwrap_or_else(|| UNKNOWN.to_string()),
        geo.country.unwrap_or_else(|| UNKNOWN.to_string())
    ))
}
