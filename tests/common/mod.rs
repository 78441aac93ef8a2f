//! Scripted in-memory container directory for driving the sync engine.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use moordns::cache::RecordCache;
use moordns::directory::{
    ChangeEvent, ContainerDirectory, ContainerInfo, EventStream, NetworkAttachment,
};
use moordns::error::{Error, Result};
use moordns::records::DnsRecord;

/// A container directory whose state and failure modes the test controls.
///
/// Each `subscribe_events` call opens a fresh channel; the test pushes
/// events, injects a stream error, or drops the sender to end the stream.
pub struct MockDirectory {
    containers: Mutex<HashMap<String, ContainerInfo>>,
    sender: Mutex<Option<mpsc::Sender<Result<ChangeEvent>>>>,
    fail_list: AtomicBool,
    fail_subscribe: AtomicBool,
    list_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            containers: Mutex::new(HashMap::new()),
            sender: Mutex::new(None),
            fail_list: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        })
    }

    pub fn insert(&self, id: &str, info: ContainerInfo) {
        self.containers.lock().unwrap().insert(id.to_string(), info);
    }

    pub fn remove(&self, id: &str) {
        self.containers.lock().unwrap().remove(id);
    }

    pub fn clear_containers(&self) {
        self.containers.lock().unwrap().clear();
    }

    pub fn set_list_failure(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_subscribe_failure(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    fn current_sender(&self) -> mpsc::Sender<Result<ChangeEvent>> {
        self.sender
            .lock()
            .unwrap()
            .clone()
            .expect("no active subscription")
    }

    /// Push an event into the currently open subscription.
    pub async fn send_event(&self, event: ChangeEvent) {
        self.current_sender()
            .send(Ok(event))
            .await
            .expect("engine dropped the subscription");
    }

    /// Deliver a transport error on the currently open subscription.
    pub async fn inject_stream_error(&self) {
        self.current_sender()
            .send(Err(Error::stream("injected failure")))
            .await
            .expect("engine dropped the subscription");
    }

    /// End the currently open subscription without an error.
    pub fn end_stream(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Wait until `subscribe_events` has been called `n` times.
    pub async fn wait_subscribed(&self, n: usize) {
        for _ in 0..500 {
            if self.subscribe_calls() >= n {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {} subscriptions", n);
    }
}

#[async_trait]
impl ContainerDirectory for MockDirectory {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::runtime("connection failure"));
        }
        Ok(self.containers.lock().unwrap().values().cloned().collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::runtime(format!("no such container: {}", id)))
    }

    async fn subscribe_events(&self) -> Result<EventStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::runtime("connection failure"));
        }
        let (tx, rx) = mpsc::channel(32);
        // Replacing the sender closes any previous subscription.
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}

pub fn attachment(ipv4: Option<&str>, ipv6: Option<&str>) -> NetworkAttachment {
    NetworkAttachment {
        ipv4: ipv4.map(|a| a.parse().expect("bad test ipv4")),
        ipv6: ipv6.map(|a| a.parse().expect("bad test ipv6")),
    }
}

/// A container with one attachment on `some-network`.
pub fn container(name: &str, ipv4: Option<&str>, ipv6: Option<&str>) -> ContainerInfo {
    let mut networks = HashMap::new();
    networks.insert("some-network".to_string(), attachment(ipv4, ipv6));
    ContainerInfo {
        name: name.to_string(),
        networks,
    }
}

pub fn domains(list: &[&str]) -> Vec<String> {
    list.iter().map(|d| d.to_string()).collect()
}

/// Poll the cache until its contents satisfy the predicate.
pub async fn wait_for_records<F>(cache: &RecordCache, predicate: F)
where
    F: Fn(&HashMap<String, Vec<DnsRecord>>) -> bool,
{
    let mut last = HashMap::new();
    for _ in 0..500 {
        last = cache.records().await;
        if predicate(&last) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("cache never reached the expected state, last: {:?}", last);
}
