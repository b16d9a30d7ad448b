// src/core/scanner/dns_scanner.rs

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{ProbeConfig, PublicResolver};
use crate::core::models::{DnsBreakdown, round2};
use crate::error::{ProbeError, Result};

/// Outcome of the primary lookup; both fields are `None` on failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DnsTiming {
    pub elapsed_ms: Option<f64>,
    pub ip: Option<IpAddr>,
}

/// Resolves `hostname` with the system resolver and times the lookup.
///
/// Never fails: an error or a timeout yields an empty `DnsTiming` so the rest
/// of the probe can continue.
pub async fn run_dns_scan(hostname: &str, limit: Duration) -> DnsTiming {
    info!(hostname, "Starting DNS resolution.");
    let start = Instant::now();
    match resolve(hostname, limit).await {
        Ok(ip) => {
            let elapsed_ms = round2(start.elapsed().as_secs_f64() * 1000.0);
            info!(hostname, %ip, elapsed_ms, "DNS resolution finished.");
            DnsTiming { elapsed_ms: Some(elapsed_ms), ip: Some(ip) }
        }
        Err(e) => {
            warn!(hostname, error = %e, "DNS resolution failed.");
            DnsTiming::default()
        }
    }
}

async fn resolve(hostname: &str, limit: Duration) -> Result<IpAddr> {
    let addrs: Vec<SocketAddr> = timeout(limit, lookup_host((hostname, 0)))
        .await
        .map_err(|_| ProbeError::Resolution(format!("lookup timed out after {:?}", limit)))?
        .map_err(|e| ProbeError::Resolution(e.to_string()))?
        .collect();

    // Prefer IPv4 to match what most probes report.
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeError::Resolution(format!("no addresses for {}", hostname)))
}

/// Capability: time the same query against several public resolvers.
#[async_trait]
pub trait ResolverSet: Send + Sync {
    /// Returns `None` when the capability is disabled.
    async fn measure(&self, hostname: &str) -> Option<DnsBreakdown>;
}

/// Used when the multi-resolver check is switched off.
pub struct DisabledResolverSet;

#[async_trait]
impl ResolverSet for DisabledResolverSet {
    async fn measure(&self, _hostname: &str) -> Option<DnsBreakdown> {
        None
    }
}

/// Queries each configured public resolver directly over UDP.
pub struct PublicResolverSet {
    resolvers: Vec<(String, TokioAsyncResolver)>,
    per_resolver_timeout: Duration,
}

impl PublicResolverSet {
    pub fn new(resolvers: &[PublicResolver], per_resolver_timeout: Duration) -> Result<Self> {
        let resolvers = resolvers
            .iter()
            .map(|resolver| {
                let ip: IpAddr = resolver.address.parse().map_err(|_| {
                    ProbeError::Config(format!("invalid resolver address '{}'", resolver.address))
                })?;
                Ok((resolver.name.clone(), single_server_resolver(ip, per_resolver_timeout)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { resolvers, per_resolver_timeout })
    }
}

fn single_server_resolver(ip: IpAddr, per_resolver_timeout: Duration) -> TokioAsyncResolver {
    let mut config = ResolverConfig::new();
    config.add_name_server(NameServerConfig::new(SocketAddr::new(ip, 53), Protocol::Udp));

    let mut opts = ResolverOpts::default();
    opts.timeout = per_resolver_timeout;
    opts.attempts = 1;
    // Every measurement must hit the wire.
    opts.cache_size = 0;
    TokioAsyncResolver::tokio(config, opts)
}

#[async_trait]
impl ResolverSet for PublicResolverSet {
    async fn measure(&self, hostname: &str) -> Option<DnsBreakdown> {
        debug!(hostname, resolvers = self.resolvers.len(), "Measuring public resolver latency.");
        let mut breakdown = DnsBreakdown::new();
        for (name, resolver) in &self.resolvers {
            let start = Instant::now();
            let latency = match timeout(self.per_resolver_timeout, resolver.ipv4_lookup(hostname)).await {
                Ok(Ok(_)) => Some(round2(start.elapsed().as_secs_f64() * 1000.0)),
                Ok(Err(e)) => {
                    warn!(resolver = %name, hostname, error = %e, "Public resolver lookup failed.");
                    None
                }
                Err(_) => {
                    warn!(resolver = %name, hostname, "Public resolver lookup timed out.");
                    None
                }
            };
            breakdown.insert(name.clone(), latency);
        }
        Some(breakdown)
    }
}

/// Picks the resolver capability once, at prober construction.
pub fn resolver_set_from_config(config: &ProbeConfig) -> Result<Box<dyn ResolverSet>> {
    if config.multi_resolver && !config.public_resolvers.is_empty() {
        Ok(Box::new(PublicResolverSet::new(&config.public_resolvers, config.resolver_timeout())?))
    } else {
        debug!("Multi-resolver check disabled.");
        Ok(Box::new(DisabledResolverSet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let timing = run_dns_scan("localhost", Duration::from_secs(5)).await;
        assert!(timing.ip.is_some_and(|ip| ip.is_loopback()));
        assert!(timing.elapsed_ms.is_some_and(|ms| ms >= 0.0));
    }

    #[tokio::test]
    async fn unresolvable_host_yields_empty_timing() {
        let timing = run_dns_scan("no-such-host.invalid", Duration::from_secs(5)).await;
        assert_eq!(timing, DnsTiming::default());
    }

    #[tokio::test]
    async fn disabled_set_reports_nothing() {
        assert!(DisabledResolverSet.measure("example.com").await.is_none());
    }

    #[tokio::test]
    async fn config_selects_capability() {
        let mut config = ProbeConfig::default();
        config.multi_resolver = false;
        let set = resolver_set_from_config(&config).expect("valid config");
        assert!(set.measure("example.com").await.is_none());

        config.multi_resolver = true;
        config.public_resolvers = vec![PublicResolver { name: "Bad".into(), address: "nope".into() }];
        assert!(resolver_set_from_config(&config).is_err());
    }
}
