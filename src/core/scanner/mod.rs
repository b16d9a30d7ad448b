// src/core/scanner/mod.rs

// This file is the public interface of the `scanner` module: it declares the
// per-stage scanners and sequences them into a `SiteReport`.
pub mod dns_scanner;
pub mod headers_scanner;
pub mod resource_scanner;
pub mod signal_scanner;
pub mod ssl_scanner;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_tls;

use reqwest::Client;
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::core::models::{ProbeOptions, ProbeTarget, SiteReport};
use crate::error::{ProbeError, Result};

use self::dns_scanner::{ResolverSet, resolver_set_from_config, run_dns_scan};
use self::headers_scanner::run_headers_scan;
use self::resource_scanner::run_resource_scan;
use self::signal_scanner::{check_compression, check_connection_reuse, detect_cdn, detect_http_version, get_server_location};
use self::ssl_scanner::run_ssl_scan;
use self::transport::{Transport, transport_from_config};

/// Probing engine with its capabilities selected once, up front.
///
/// A `Prober` holds no per-target state, so one instance can serve any number
/// of probes, sequentially or concurrently.
pub struct Prober {
    config: ProbeConfig,
    /// Client for detectors and sub-resources. Pools connections, which the
    /// connection-reuse check relies on.
    client: Client,
    transport: Box<dyn Transport>,
    resolvers: Box<dyn ResolverSet>,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        config.validate()?;
        let client = http_client(&config)?;
        let transport = transport_from_config(&config)?;
        let resolvers = resolver_set_from_config(&config)?;
        info!(transport = transport.name(), multi_resolver = config.multi_resolver, "Prober ready.");
        Ok(Self { config, client, transport, resolvers })
    }

    /// Runs every stage against `input` and assembles the report.
    ///
    /// Stage failures are logged and leave their fields empty; the only error
    /// returned is an input that cannot be turned into a target at all.
    pub async fn probe(&self, input: &str, options: &ProbeOptions) -> Result<SiteReport> {
        let target = ProbeTarget::parse(input)?;
        let url = target.url().clone();
        let hostname = target.hostname();
        info!(url = %url, hostname, ?options, "Starting site probe.");

        let mut report = SiteReport::empty(url.as_str());

        let dns = run_dns_scan(hostname, self.config.dns_timeout()).await;
        report.timing.dns_ms = dns.elapsed_ms;
        report.ip = dns.ip.map(|ip| ip.to_string());

        if options.check_advanced {
            report.dns_breakdown = self.resolvers.measure(hostname).await;
        }

        if target.is_https() {
            report.tls = run_ssl_scan(hostname, self.config.tls_timeout()).await;
        }

        let fetched = match self.transport.fetch(&url).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(url = %url, error = %e, "Primary fetch failed.");
                None
            }
        };

        if let Some(outcome) = fetched {
            report.timing.tcp_ms = outcome.timing.tcp_ms;
            report.timing.tls_ms = outcome.timing.tls_ms;
            report.timing.ttfb_ms = Some(outcome.timing.ttfb_ms);
            report.timing.total_ms = Some(outcome.timing.total_ms);
            report.status_code = Some(outcome.status);
            report.size_kb = Some(outcome.size_kb);

            if options.check_advanced {
                let limit = self.config.detector_timeout();
                report.http_version = Some(detect_http_version(outcome.version));
                report.cdn_provider = Some(detect_cdn(&outcome.headers));
                report.compression = Some(check_compression(&self.client, url.as_str(), limit).await);
                report.security_headers = Some(run_headers_scan(&outcome.headers));

                if let Some(ip) = dns.ip {
                    report.server_location = Some(
                        get_server_location(&self.client, &self.config.geolocation_endpoint, ip, self.config.geo_timeout())
                            .await,
                    );
                }

                report.connection_reuse_benefit = match check_connection_reuse(&self.config, url.as_str()).await {
                    Ok(reuse) => Some(reuse.benefit_ms),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Connection reuse check failed.");
                        None
                    }
                };
            }

            if options.fetch_resources {
                report.resources = Some(
                    run_resource_scan(
                        &self.client,
                        &outcome.final_url,
                        &outcome.body,
                        options.resource_limit,
                        self.config.resource_workers,
                        self.config.resource_timeout(),
                    )
                    .await,
                );
            }
        }

        info!(
            url = %report.url,
            status = ?report.status_code,
            tls_score = report.tls.score,
            headers_score = ?report.security_headers.as_ref().map(|h| h.score),
            "Site probe finished."
        );
        Ok(report)
    }
}

/// Builds a pooled client with the configured user agent and redirect limit.
pub(crate) fn http_client(config: &ProbeConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Probes one target with the default configuration.
pub async fn run_site_probe(input: &str, options: &ProbeOptions) -> Result<SiteReport> {
    Prober::new(ProbeConfig::default())?.probe(input, options).await
}
