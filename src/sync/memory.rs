use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{RemoteEvent, RemoteStore, SubscriberHub, Subscription};

/// In-process remote store. Every client holding the same `Arc` sees the
/// others' writes, which makes it the stand-in for the hosted database in
/// tests and single-process setups.
#[derive(Default)]
pub struct MemoryRemote {
    documents: Mutex<HashMap<String, Value>>,
    hub: Arc<SubscriberHub>,
    write_failure: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        match self.documents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.documents().get(path).cloned()
    }

    /// Stores `value` as if another client wrote it.
    pub fn put(&self, path: &str, value: Value) {
        let mut documents = self.documents();
        documents.insert(path.to_string(), value.clone());
        self.hub.publish(path, RemoteEvent::Snapshot(Some(value)));
    }

    /// Deletes the path and tells subscribers it is gone.
    pub fn clear(&self, path: &str) {
        let mut documents = self.documents();
        documents.remove(path);
        self.hub.publish(path, RemoteEvent::Snapshot(None));
    }

    /// Makes every following write fail with `reason` until reset with `None`.
    pub fn fail_writes(&self, reason: Option<&str>) {
        let mut failure = match self.write_failure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *failure = reason.map(str::to_string);
    }

    /// Delivers a read error to the path's subscribers.
    pub fn emit_error(&self, path: &str, reason: &str) {
        self.hub.publish(path, RemoteEvent::Failed(reason.to_string()));
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.hub.subscriber_count(path)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn subscribe(&self, path: &str) -> Subscription {
        // Held across registration so a concurrent write can't slip in
        // between the snapshot and the subscriber joining.
        let documents = self.documents();
        let (subscription, revision) = self.hub.register(path);
        let current = documents.get(path).cloned();
        self.hub
            .deliver_if_current(path, subscription.id(), revision, RemoteEvent::Snapshot(current));
        subscription
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        let failure = match self.write_failure.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(reason) = failure {
            bail!("write to '{path}' rejected: {reason}");
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.put(path, value);
        Ok(())
    }
}
