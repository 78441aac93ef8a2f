//! Record generation and DNS name handling.
//!
//! Everything here is pure: container state in, records or names out. The
//! synchronization engine and the DNS frontend both build on these
//! functions, so their edge cases (absent address families, malformed
//! container names, the root domain) are pinned down by unit tests.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::directory::NetworkAttachment;
use crate::error::{Error, Result};

/// DNS record types moordns serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    A,
    Aaaa,
}

/// One generated DNS record. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub kind: RecordKind,
    pub fqdn: String,
    pub addr: IpAddr,
}

/// Generate the records for one FQDN from one network attachment.
///
/// An absent address family yields no record of that type; a record never
/// carries an empty address.
pub fn generate(fqdn: &str, attachment: &NetworkAttachment) -> Vec<DnsRecord> {
    let mut records = Vec::new();
    if let Some(ipv4) = attachment.ipv4 {
        records.push(DnsRecord {
            kind: RecordKind::A,
            fqdn: fqdn.to_string(),
            addr: IpAddr::V4(ipv4),
        });
    }
    if let Some(ipv6) = attachment.ipv6 {
        records.push(DnsRecord {
            kind: RecordKind::Aaaa,
            fqdn: fqdn.to_string(),
            addr: IpAddr::V6(ipv6),
        });
    }
    records
}

/// Union of records across all of a container's network attachments.
pub fn container_records(
    fqdn: &str,
    networks: &HashMap<String, NetworkAttachment>,
) -> Vec<DnsRecord> {
    let mut records = Vec::new();
    for attachment in networks.values() {
        records.extend(generate(fqdn, attachment));
    }
    records
}

/// Extract the DNS label from a runtime container name.
///
/// The runtime reports names in path form (`/web-1`). A name without the
/// leading separator, with nothing after it, or with further separators is
/// malformed and returns an error rather than panicking.
pub fn host_label(name: &str) -> Result<&str> {
    let label = name
        .strip_prefix('/')
        .ok_or_else(|| Error::ContainerName(name.to_string()))?;
    if label.is_empty() || label.contains('/') {
        return Err(Error::ContainerName(name.to_string()));
    }
    Ok(label)
}

/// Join a container label with a domain suffix into a cache key.
///
/// The domain must already be normalized (see [`normalize_domain`]). DNS
/// names compare case-insensitively and hickory hands the handler
/// lowercased query names, so keys are lowercased here.
///
/// `join_fqdn("web-1", "example.org.")` is `web-1.example.org.`;
/// the root domain `.` yields `web-1.`.
pub fn join_fqdn(label: &str, domain: &str) -> String {
    let domain = domain.trim_start_matches('.');
    format!("{}.{}", label, domain).to_ascii_lowercase()
}

/// Normalize a configured domain suffix: lowercase, trailing dot ensured.
pub fn normalize_domain(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("domain suffix must not be empty".into()));
    }
    let mut domain = trimmed.to_ascii_lowercase();
    if !domain.ends_with('.') {
        domain.push('.');
    }
    Ok(domain)
}

/// Whether a query name falls under a managed domain suffix.
///
/// The root domain matches every name.
pub fn in_domain(name: &str, domain: &str) -> bool {
    if domain == "." {
        return true;
    }
    name == domain || name.ends_with(&format!(".{}", domain))
}
