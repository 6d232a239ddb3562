//! Same-device key/value persistence with change notifications shared by
//! every handle opened on the same backend.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use anyhow::Result;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// A key changed. `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
    /// Handle that made the change, if it identified itself.
    pub origin: Option<Uuid>,
}

pub trait LocalStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, origin: Option<Uuid>) -> Result<()>;

    fn remove(&self, key: &str, origin: Option<Uuid>) -> Result<()>;

    fn watch(&self) -> broadcast::Receiver<StorageEvent>;
}

/// Broadcasts storage events to every watcher.
#[derive(Clone)]
pub struct StorageBus {
    sender: broadcast::Sender<StorageEvent>,
}

impl Default for StorageBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }
}

impl StorageBus {
    pub fn publish(&self, key: &str, new_value: Option<String>, origin: Option<Uuid>) {
        // No receivers just means nobody is watching yet.
        let _ = self.sender.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.sender.subscribe()
    }
}
