use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{bail, Result};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{LocalStorage, StorageBus, StorageEvent};

#[derive(Default)]
struct Entries {
    values: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

/// Volatile storage with an optional byte quota across all keys.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<Entries>,
    bus: StorageBus,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        let storage = Self::default();
        storage.set_quota(Some(quota_bytes));
        storage
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_quota(&self, quota_bytes: Option<usize>) {
        self.entries().quota_bytes = quota_bytes;
    }

    /// Stores `raw` without any validation, as a foreign writer would.
    pub fn put_raw(&self, key: &str, raw: &str) {
        self.entries().values.insert(key.to_string(), raw.to_string());
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, origin: Option<Uuid>) -> Result<()> {
        {
            let mut entries = self.entries();
            if let Some(quota) = entries.quota_bytes {
                let used: usize = entries
                    .values
                    .iter()
                    .filter(|(existing, _)| existing.as_str() != key)
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                let needed = used + key.len() + value.len();
                if needed > quota {
                    bail!("storage quota exceeded writing '{key}' ({needed} > {quota} bytes)");
                }
            }
            entries.values.insert(key.to_string(), value.to_string());
        }
        self.bus.publish(key, Some(value.to_string()), origin);
        Ok(())
    }

    fn remove(&self, key: &str, origin: Option<Uuid>) -> Result<()> {
        self.entries().values.remove(key);
        self.bus.publish(key, None, origin);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.bus.subscribe()
    }
}
