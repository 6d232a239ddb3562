use std::sync::Weak;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::SubscriberHub;

/// What a subscriber hears about a path.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// Current value at the path; `None` when nothing was ever written.
    Snapshot(Option<Value>),
    /// The store could not read the path.
    Failed(String),
}

/// A path-addressed JSON store with live subscriptions. A fresh
/// subscription first receives the current snapshot, then every change.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    fn subscribe(&self, path: &str) -> Subscription;

    /// Replaces the whole value at `path`.
    async fn write(&self, path: &str, value: Value) -> Result<()>;
}

/// Live feed for one path. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    path: String,
    events: mpsc::UnboundedReceiver<RemoteEvent>,
    hub: Weak<SubscriberHub>,
}

impl Subscription {
    pub(crate) fn new(
        id: Uuid,
        path: String,
        events: mpsc::UnboundedReceiver<RemoteEvent>,
        hub: Weak<SubscriberHub>,
    ) -> Self {
        Self {
            id,
            path,
            events,
            hub,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next event, or `None` once the store went away.
    pub async fn next(&mut self) -> Option<RemoteEvent> {
        self.events.recv().await
    }

    pub fn try_next(&mut self) -> Option<RemoteEvent> {
        self.events.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(&self.path, self.id);
        }
    }
}
