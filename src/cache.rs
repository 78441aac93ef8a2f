//! The shared FQDN -> record map.
//!
//! Exactly one writer (the synchronization engine) mutates the cache; the
//! DNS frontend and tests only read it. Every write swaps whole values
//! under the lock, so a reader sees either the fully-old or the fully-new
//! record list for a key, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::records::{DnsRecord, RecordKind};

/// Cheaply clonable handle to the record map.
#[derive(Debug, Clone, Default)]
pub struct RecordCache {
    inner: Arc<RwLock<HashMap<String, Vec<DnsRecord>>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire record list for `fqdn`.
    pub async fn put(&self, fqdn: String, records: Vec<DnsRecord>) {
        let mut map = self.inner.write().await;
        debug!("cache put {} ({} records)", fqdn, records.len());
        map.insert(fqdn, records);
    }

    /// Delete the key entirely. Absence means "no records", and the
    /// distinction from an empty list is kept for diagnostics.
    pub async fn remove(&self, fqdn: &str) {
        let mut map = self.inner.write().await;
        if map.remove(fqdn).is_some() {
            debug!("cache removed {}", fqdn);
        }
    }

    /// Wholesale replacement with a freshly derived snapshot. Used only
    /// when resynchronizing, so no entry from an unconfirmed state
    /// survives.
    pub async fn replace(&self, records: HashMap<String, Vec<DnsRecord>>) {
        let mut map = self.inner.write().await;
        debug!("cache replaced with {} names", records.len());
        *map = records;
    }

    /// Discard everything. Entered together with stream recovery.
    pub async fn clear(&self) {
        let mut map = self.inner.write().await;
        debug!("cache cleared ({} names dropped)", map.len());
        map.clear();
    }

    /// Look up the records of one kind for a name.
    ///
    /// Returns an empty list when the name is absent or has no record of
    /// that kind; never an error.
    pub async fn resolve(&self, fqdn: &str, kind: RecordKind) -> Vec<DnsRecord> {
        let map = self.inner.read().await;
        match map.get(fqdn) {
            Some(records) => records.iter().filter(|r| r.kind == kind).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Bulk view of the whole map, for diagnostics and tests.
    pub async fn records(&self) -> HashMap<String, Vec<DnsRecord>> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn a_record(fqdn: &str, addr: &str) -> DnsRecord {
        DnsRecord {
            kind: RecordKind::A,
            fqdn: fqdn.to_string(),
            addr: addr.parse::<IpAddr>().unwrap(),
        }
    }

    fn aaaa_record(fqdn: &str, addr: &str) -> DnsRecord {
        DnsRecord {
            kind: RecordKind::Aaaa,
            fqdn: fqdn.to_string(),
            addr: addr.parse::<IpAddr>().unwrap(),
        }
    }

    #[tokio::test]
    async fn resolve_filters_by_kind() {
        let cache = RecordCache::new();
        cache
            .put(
                "web.domain.".into(),
                vec![
                    a_record("web.domain.", "172.0.0.3"),
                    aaaa_record("web.domain.", "2001:db8::3"),
                ],
            )
            .await;

        let a = cache.resolve("web.domain.", RecordKind::A).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].addr, "172.0.0.3".parse::<IpAddr>().unwrap());

        let aaaa = cache.resolve("web.domain.", RecordKind::Aaaa).await;
        assert_eq!(aaaa.len(), 1);
        assert_eq!(aaaa[0].addr, "2001:db8::3".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn resolve_missing_name_is_empty_not_error() {
        let cache = RecordCache::new();
        assert!(cache.resolve("nope.domain.", RecordKind::A).await.is_empty());
    }

    #[tokio::test]
    async fn resolve_wrong_kind_is_empty() {
        let cache = RecordCache::new();
        cache
            .put("web.domain.".into(), vec![a_record("web.domain.", "172.0.0.3")])
            .await;
        assert!(cache
            .resolve("web.domain.", RecordKind::Aaaa)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn put_replaces_whole_list() {
        let cache = RecordCache::new();
        cache
            .put("web.domain.".into(), vec![a_record("web.domain.", "172.0.0.3")])
            .await;
        cache
            .put("web.domain.".into(), vec![a_record("web.domain.", "172.0.0.9")])
            .await;

        let records = cache.resolve("web.domain.", RecordKind::A).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].addr, "172.0.0.9".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn remove_deletes_the_key() {
        let cache = RecordCache::new();
        cache
            .put("web.domain.".into(), vec![a_record("web.domain.", "172.0.0.3")])
            .await;
        cache.remove("web.domain.").await;

        assert!(cache.is_empty().await);
        assert!(!cache.records().await.contains_key("web.domain."));
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_map() {
        let cache = RecordCache::new();
        cache
            .put("old.domain.".into(), vec![a_record("old.domain.", "172.0.0.3")])
            .await;

        let mut fresh = HashMap::new();
        fresh.insert(
            "new.domain.".to_string(),
            vec![a_record("new.domain.", "172.0.0.4")],
        );
        cache.replace(fresh).await;

        assert!(cache.resolve("old.domain.", RecordKind::A).await.is_empty());
        assert_eq!(cache.resolve("new.domain.", RecordKind::A).await.len(), 1);
        assert_eq!(cache.len().await, 1);
    }
}
