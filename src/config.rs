use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::records::normalize_domain;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Domain suffixes container records are published under. Normalized
    /// at load: lowercased, trailing dot ensured.
    pub domains: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_ip: Option<String>,
    pub dns_bind: SocketAddr,
    /// TTL for records answered from the container cache.
    pub ttl: u32,
    /// Forward queries outside the managed domains to the system
    /// resolvers.
    pub forward: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domains: vec!["docker.".into()],
            bind_ip: None,
            dns_bind: "0.0.0.0:53".parse().unwrap(),
            ttl: 50,
            forward: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("moordns.toml"))
            .merge(Json::file("moordns.json"))
            .merge(Env::prefixed("MOORDNS_"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;

        // If bind_ip is set, override the IP part of dns_bind
        if let Some(ref ip) = config.bind_ip {
            let port = config.dns_bind.port();
            config.dns_bind = format!("{}:{}", ip, port)
                .parse()
                .map_err(|_| Error::Config(format!("invalid bind_ip: {:?}", ip)))?;
        }

        Ok(config)
    }

    /// Normalize the domain list in place; at least one suffix is
    /// required.
    pub fn validate(&mut self) -> Result<()> {
        if self.domains.is_empty() {
            return Err(Error::Config("at least one domain suffix is required".into()));
        }
        self.domains = self
            .domains
            .iter()
            .map(|d| normalize_domain(d))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_normalizes_domains() {
        let mut config = Config {
            domains: vec!["Example.Org".into(), "internal.".into()],
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.domains, vec!["example.org.", "internal."]);
    }

    #[test]
    fn validate_rejects_empty_domain_list() {
        let mut config = Config {
            domains: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let mut config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.domains, vec!["docker."]);
        assert_eq!(config.ttl, 50);
        assert!(config.forward);
    }
}
