// src/core/scanner/headers_scanner.rs

use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::core::models::{SecurityHeaderAssessment, truncate_chars};

/// Security headers and the points each one is worth. Sums to 100.
pub const SECURITY_HEADER_WEIGHTS: &[(&str, u8)] = &[
    ("strict-transport-security", 20),
    ("content-security-policy", 20),
    ("x-frame-options", 15),
    ("x-content-type-options", 15),
    ("referrer-policy", 10),
    ("permissions-policy", 10),
    ("x-xss-protection", 10),
];

/// Reads a header value, replacing non-UTF-8 content with a placeholder.
///
/// `HeaderMap` lookups are case-insensitive, so `Strict-Transport-Security`
/// and `strict-transport-security` resolve to the same entry.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            Some("[Invalid UTF-8]".to_string())
        }
    }
}

/// Scores the security headers of an already fetched response.
///
/// # Arguments
/// * `headers` - The response headers of the primary fetch.
///
/// # Returns
/// The summed weight of the headers present, their values cut to 50 characters,
/// and the names of the missing ones in table order.
pub fn run_headers_scan(headers: &HeaderMap) -> SecurityHeaderAssessment {
    let mut assessment = SecurityHeaderAssessment::default();
    for (name, points) in SECURITY_HEADER_WEIGHTS {
        match header_value(headers, name) {
            Some(value) => {
                debug!(header_name = name, points, "Security header present.");
                assessment.score += points;
                assessment.present.insert(name.to_string(), truncate_chars(&value, 50));
            }
            None => {
                debug!(header_name = name, "Security header missing.");
                assessment.missing.push(name.to_string());
            }
        }
    }
    assessment
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).expect("valid name"),
                HeaderValue::from_str(value).expect("valid value"),
            );
        }
        map
    }

    #[test]
    fn weights_sum_to_100() {
        let total: u32 = SECURITY_HEADER_WEIGHTS.iter().map(|(_, p)| u32::from(*p)).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn no_headers_scores_zero_and_lists_all_missing() {
        let result = run_headers_scan(&HeaderMap::new());
        assert_eq!(result.score, 0);
        assert!(result.present.is_empty());
        let expected: Vec<String> = SECURITY_HEADER_WEIGHTS.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(result.missing, expected);
    }

    #[test]
    fn matches_names_case_insensitively() {
        let map = headers(&[("Strict-Transport-Security", "max-age=63072000"), ("X-Frame-Options", "DENY")]);
        let result = run_headers_scan(&map);
        assert_eq!(result.score, 35);
        assert_eq!(result.present["strict-transport-security"], "max-age=63072000");
        assert_eq!(result.missing.len(), 5);
    }

    #[test]
    fn long_values_are_truncated() {
        let csp = "default-src 'self'; script-src 'self' https://cdn.example.com https://static.example.com";
        let result = run_headers_scan(&headers(&[("content-security-policy", csp)]));
        assert_eq!(result.present["content-security-policy"].chars().count(), 50);
    }

    #[test]
    fn present_and_missing_partition_the_table() {
        let map = headers(&[
            ("content-security-policy", "default-src 'self'"),
            ("referrer-policy", "no-referrer"),
            ("x-xss-protection", "0"),
            ("server", "nginx"),
        ]);
        let result = run_headers_scan(&map);
        assert_eq!(result.score, 40);
        assert_eq!(result.present.len() + result.missing.len(), SECURITY_HEADER_WEIGHTS.len());
        assert!(result.missing.iter().all(|m| !result.present.contains_key(m)));
    }
}
