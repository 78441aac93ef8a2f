//! The synchronization engine.
//!
//! `ContainerDns` owns the record cache and keeps it matched to the
//! container runtime's live state: a full snapshot at construction, then a
//! long-lived event subscription applying targeted mutations, and a full
//! discard-and-resync whenever the subscription is disrupted. It is the
//! cache's only writer, and it consumes events one at a time, so queries
//! never observe a half-applied update.

use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::cache::RecordCache;
use crate::directory::{ChangeEvent, ContainerDirectory, EventStream, NetworkAttachment};
use crate::error::{Error, Result};
use crate::records::{container_records, host_label, join_fqdn, DnsRecord};

/// Fixed delay between reconnect attempts while recovering.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Outcome of a streaming phase.
enum Disruption {
    /// The subscription errored or ended; recover.
    Stream,
    /// Shutdown was signalled; stop for good.
    Shutdown,
}

pub struct ContainerDns<D> {
    directory: D,
    domains: Vec<String>,
    cache: RecordCache,
}

impl<D: ContainerDirectory> ContainerDns<D> {
    /// Build the engine and load the initial snapshot.
    ///
    /// This is the one failure that is not retried: if the runtime cannot
    /// even be listed, the caller decides whether to abort or disable.
    pub async fn new(directory: D, domains: Vec<String>) -> Result<Self> {
        let cache = RecordCache::new();
        let records = snapshot(&directory, &domains)
            .await
            .map_err(|e| Error::Startup(e.to_string()))?;
        info!("initial scan found {} names", records.len());
        cache.replace(records).await;
        Ok(Self {
            directory,
            domains,
            cache,
        })
    }

    /// Reader handle for the DNS frontend and diagnostics.
    pub fn cache(&self) -> RecordCache {
        self.cache.clone()
    }

    /// Consume the event stream for the lifetime of the process.
    ///
    /// Streaming applies events in arrival order; any disruption clears
    /// the cache and enters the reconnect loop. Every await point races
    /// the shutdown signal, so a stuck stream or a pending reconnect delay
    /// never outlives the process.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = match self.directory.subscribe_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("event subscription failed: {}", e);
                match self.recover(&mut shutdown).await {
                    Some(events) => events,
                    None => return,
                }
            }
        };

        loop {
            if let Disruption::Shutdown = self.stream(&mut events, &mut shutdown).await {
                info!("sync engine shutting down");
                return;
            }
            match self.recover(&mut shutdown).await {
                Some(fresh) => events = fresh,
                None => {
                    info!("sync engine shutting down");
                    return;
                }
            }
        }
    }

    /// Streaming state: apply events until the subscription is disrupted
    /// or shutdown is signalled.
    async fn stream(&self, events: &mut EventStream, shutdown: &mut watch::Receiver<bool>) -> Disruption {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Disruption::Shutdown,
                item = events.recv() => match item {
                    Some(Ok(event)) => self.apply_event(event).await,
                    Some(Err(e)) => {
                        warn!("event stream error: {}", e);
                        return Disruption::Stream;
                    }
                    None => {
                        warn!("event stream ended");
                        return Disruption::Stream;
                    }
                },
            }
        }
    }

    /// Recovering state: the cache is discarded immediately (events may
    /// have been missed, so its accuracy cannot be guaranteed), then
    /// subscribe + full resync are retried with a fixed delay until both
    /// succeed. Subscribing before snapshotting means no event slips
    /// between the two.
    ///
    /// Returns `None` when shutdown is signalled while recovering.
    async fn recover(&self, shutdown: &mut watch::Receiver<bool>) -> Option<EventStream> {
        self.cache.clear().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => return None,
                _ = sleep(RECONNECT_DELAY) => {}
            }

            let events = match self.directory.subscribe_events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("reconnect failed: {}, retrying", e);
                    continue;
                }
            };
            match snapshot(&self.directory, &self.domains).await {
                Ok(records) => {
                    info!("resynchronized {} names", records.len());
                    self.cache.replace(records).await;
                    return Some(events);
                }
                Err(e) => {
                    warn!("full resync failed: {}, retrying", e);
                }
            }
        }
    }

    /// Apply one change event to the cache.
    ///
    /// Inspect failures drop the event: the next event or resync corrects
    /// any drift, and one bad lookup must not take the server down.
    async fn apply_event(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Connect { container_id } => {
                let info = match self.directory.inspect_container(&container_id).await {
                    Ok(info) => info,
                    Err(e) => {
                        warn!("dropping connect event for {}: {}", container_id, e);
                        return;
                    }
                };
                self.put_container(&info.name, &info.networks).await;
            }
            ChangeEvent::Disconnect { container_id } => {
                let info = match self.directory.inspect_container(&container_id).await {
                    Ok(info) => info,
                    Err(e) => {
                        // The container may already be gone; its records
                        // stay until the next full resync.
                        warn!("dropping disconnect event for {}: {}", container_id, e);
                        return;
                    }
                };
                self.remove_container(&info.name).await;
            }
            ChangeEvent::Rename {
                old_name,
                new_name,
                networks,
            } => {
                self.remove_container(&old_name).await;
                self.put_container(&new_name, &networks).await;
            }
        }
    }

    /// Publish records for every domain FQDN of a container.
    async fn put_container(&self, name: &str, networks: &HashMap<String, NetworkAttachment>) {
        let label = match host_label(name) {
            Ok(label) => label,
            Err(e) => {
                warn!("skipping container: {}", e);
                return;
            }
        };
        for domain in &self.domains {
            let fqdn = join_fqdn(label, domain);
            let records = container_records(&fqdn, networks);
            debug!("container {} -> {} ({} records)", name, fqdn, records.len());
            self.cache.put(fqdn, records).await;
        }
    }

    /// Drop every domain FQDN of a container.
    async fn remove_container(&self, name: &str) {
        let label = match host_label(name) {
            Ok(label) => label,
            Err(e) => {
                warn!("skipping container: {}", e);
                return;
            }
        };
        for domain in &self.domains {
            self.cache.remove(&join_fqdn(label, domain)).await;
        }
    }
}

/// Derive the full record map from a fresh container listing.
async fn snapshot<D: ContainerDirectory>(
    directory: &D,
    domains: &[String],
) -> Result<HashMap<String, Vec<DnsRecord>>> {
    let containers = directory.list_containers().await?;
    let mut records = HashMap::new();
    for info in &containers {
        let label = match host_label(&info.name) {
            Ok(label) => label,
            Err(e) => {
                warn!("skipping container: {}", e);
                continue;
            }
        };
        for domain in domains {
            let fqdn = join_fqdn(label, domain);
            let generated = container_records(&fqdn, &info.networks);
            records.insert(fqdn, generated);
        }
    }
    Ok(records)
}
