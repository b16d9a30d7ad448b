// src/core/target.rs

use tracing::debug;
use url::Url;

use crate::core::models::ProbeTarget;
use crate::error::{ProbeError, Result};

impl ProbeTarget {
    /// Normalizes a user-supplied address into a probe target.
    ///
    /// Inputs without an `http://`/`https://` scheme get `http://` prepended. The
    /// hostname is reduced to its registrable form (`www.shop.example.co.uk`
    /// becomes `example.co.uk`); hosts without a registrable domain, such as
    /// IP literals or `localhost`, are kept as they are.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ProbeError::invalid_target(input, "empty address"));
        }

        let normalized = if has_http_scheme(trimmed) {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let url = Url::parse(&normalized).map_err(|e| ProbeError::invalid_target(input, e))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::invalid_target(input, "missing host"))?;

        let hostname = registrable_hostname(host);
        debug!(url = %url, hostname = %hostname, "Normalized probe target.");
        Ok(Self { url, hostname })
    }
}

fn has_http_scheme(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn registrable_hostname(host: &str) -> String {
    let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    psl::domain_str(&host).map(str::to_string).unwrap_or(host)
}
