// src/config.rs

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ProbeError, Result};

/// Which transport performs the primary fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportMode {
    /// Instrumented transport first, coarse transport when it fails.
    #[default]
    Auto,
    /// Instrumented transport only (TCP/TLS sub-timings).
    Instrumented,
    /// Coarse transport only (TTFB and total).
    Coarse,
}

/// A public DNS resolver used by the multi-resolver latency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicResolver {
    pub name: String,
    pub address: String,
}

fn default_public_resolvers() -> Vec<PublicResolver> {
    [("Google DNS", "8.8.8.8"), ("Cloudflare DNS", "1.1.1.1"), ("OpenDNS", "208.67.222.222")]
        .into_iter()
        .map(|(name, address)| PublicResolver { name: name.to_string(), address: address.to_string() })
        .collect()
}

/// Tunables of the probing engine. Every timeout is expressed in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub dns_timeout_secs: u64,
    pub resolver_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub tls_timeout_secs: u64,
    pub detector_timeout_secs: u64,
    pub geo_timeout_secs: u64,
    pub resource_timeout_secs: u64,
    pub max_redirects: usize,
    pub resource_workers: usize,
    pub user_agent: String,
    pub transport: TransportMode,
    pub multi_resolver: bool,
    pub public_resolvers: Vec<PublicResolver>,
    /// Geolocation lookup URL; `{ip}` is replaced by the resolved address.
    pub geolocation_endpoint: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_timeout_secs: 5,
            resolver_timeout_secs: 5,
            fetch_timeout_secs: 30,
            tls_timeout_secs: 10,
            detector_timeout_secs: 10,
            geo_timeout_secs: 5,
            resource_timeout_secs: 5,
            max_redirects: 10,
            resource_workers: 8,
            user_agent: concat!("sitepulse/", env!("CARGO_PKG_VERSION")).to_string(),
            transport: TransportMode::Auto,
            multi_resolver: true,
            public_resolvers: default_public_resolvers(),
            geolocation_endpoint: "http://ip-api.com/json/{ip}".to_string(),
        }
    }
}

impl ProbeConfig {
    /// Loads a YAML configuration file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: ProbeConfig =
            serde_yaml::from_str(raw).map_err(|e| ProbeError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make a probe block forever or never run.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("dns_timeout_secs", self.dns_timeout_secs),
            ("resolver_timeout_secs", self.resolver_timeout_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("tls_timeout_secs", self.tls_timeout_secs),
            ("detector_timeout_secs", self.detector_timeout_secs),
            ("geo_timeout_secs", self.geo_timeout_secs),
            ("resource_timeout_secs", self.resource_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ProbeError::Config(format!("{} must be greater than zero", name)));
        }
        if self.resource_workers == 0 {
            return Err(ProbeError::Config("resource_workers must be greater than zero".to_string()));
        }
        if !self.geolocation_endpoint.contains("{ip}") {
            return Err(ProbeError::Config("geolocation_endpoint must contain an {ip} placeholder".to_string()));
        }
        for resolver in &self.public_resolvers {
            resolver.address.parse::<std::net::IpAddr>().map_err(|_| {
                ProbeError::Config(format!("resolver '{}' has an invalid address '{}'", resolver.name, resolver.address))
            })?;
        }
        Ok(())
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_timeout_secs)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_secs(self.geo_timeout_secs)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn defaults_match_probe_budgets() {
        let config = ProbeConfig::default();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.tls_timeout(), Duration::from_secs(10));
        assert_eq!(config.resource_workers, 8);
        assert_eq!(config.public_resolvers.len(), 3);
        assert_eq!(config.transport, TransportMode::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
            fetch_timeout_secs: 12
            transport: coarse
            public_resolvers:
              - name: Quad9
                address: 9.9.9.9
        "#;
        let config = ProbeConfig::from_yaml_str(yaml).expect("valid config");
        assert_eq!(config.fetch_timeout_secs, 12);
        assert_eq!(config.transport, TransportMode::Coarse);
        assert_eq!(config.public_resolvers[0].name, "Quad9");
        assert_eq!(config.tls_timeout_secs, 10);
    }

    #[test]
    fn rejects_zero_timeouts_and_bad_resolvers() {
        assert!(ProbeConfig::from_yaml_str("dns_timeout_secs: 0").is_err());
        let yaml = r#"
            public_resolvers:
              - name: Broken
                address: not-an-ip
        "#;
        assert!(matches!(ProbeConfig::from_yaml_str(yaml), Err(ProbeError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "resource_workers: 4").expect("write");
        let config = ProbeConfig::from_yaml_file(file.path()).expect("valid config");
        assert_eq!(config.resource_workers, 4);
    }

    #[test]
    fn transport_mode_parses_from_cli_text() {
        assert_eq!(TransportMode::from_str("instrumented").ok(), Some(TransportMode::Instrumented));
        assert_eq!(TransportMode::Coarse.to_string(), "coarse");
    }
}
