use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{RemoteEvent, Subscription};

#[derive(Default)]
struct PathSubscribers {
    senders: Vec<(Uuid, mpsc::UnboundedSender<RemoteEvent>)>,
    /// Bumped on every publish; lets a late initial read detect that a
    /// newer value already went out.
    revision: u64,
}

/// Fan-out of remote events to every subscriber of a path.
#[derive(Default)]
pub struct SubscriberHub {
    paths: Mutex<HashMap<String, PathSubscribers>>,
}

impl SubscriberHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PathSubscribers>> {
        match self.paths.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adds a subscriber and returns it with the path's current revision.
    pub fn register(self: &Arc<Self>, path: &str) -> (Subscription, u64) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut paths = self.lock();
        let entry = paths.entry(path.to_string()).or_default();
        entry.senders.push((id, tx));
        let revision = entry.revision;
        drop(paths);

        (
            Subscription::new(id, path.to_string(), rx, Arc::downgrade(self)),
            revision,
        )
    }

    /// Sends `event` to one subscriber unless the path was published to
    /// since `revision`.
    pub fn deliver_if_current(&self, path: &str, id: Uuid, revision: u64, event: RemoteEvent) -> bool {
        let paths = self.lock();
        let Some(entry) = paths.get(path) else {
            return false;
        };
        if entry.revision != revision {
            return false;
        }
        entry
            .senders
            .iter()
            .find(|(subscriber, _)| *subscriber == id)
            .map(|(_, tx)| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    pub fn publish(&self, path: &str, event: RemoteEvent) {
        let mut paths = self.lock();
        let entry = paths.entry(path.to_string()).or_default();
        entry.revision += 1;
        entry.senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn remove(&self, path: &str, id: Uuid) {
        let mut paths = self.lock();
        if let Some(entry) = paths.get_mut(path) {
            entry.senders.retain(|(subscriber, _)| *subscriber != id);
        }
    }

    /// Paths with at least one live subscriber.
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, entry)| !entry.senders.is_empty())
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.lock().get(path).map(|entry| entry.senders.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publishes_to_every_subscriber_of_a_path() {
        let hub = SubscriberHub::new();
        let (mut a, _) = hub.register("board");
        let (mut b, _) = hub.register("board");
        let (mut other, _) = hub.register("prefs");

        hub.publish("board", RemoteEvent::Snapshot(Some(json!({ "1": [] }))));

        assert_eq!(a.try_next(), Some(RemoteEvent::Snapshot(Some(json!({ "1": [] })))));
        assert!(b.try_next().is_some());
        assert!(other.try_next().is_none());
    }

    #[test]
    fn dropping_a_subscription_unregisters_it() {
        let hub = SubscriberHub::new();
        let (a, _) = hub.register("board");
        let (_b, _) = hub.register("board");
        assert_eq!(hub.subscriber_count("board"), 2);

        a.unsubscribe();
        assert_eq!(hub.subscriber_count("board"), 1);
    }

    #[test]
    fn stale_initial_delivery_is_skipped() {
        let hub = SubscriberHub::new();
        let (mut sub, revision) = hub.register("board");

        hub.publish("board", RemoteEvent::Snapshot(Some(json!(2))));
        assert!(!hub.deliver_if_current("board", sub.id(), revision, RemoteEvent::Snapshot(Some(json!(1)))));

        assert_eq!(sub.try_next(), Some(RemoteEvent::Snapshot(Some(json!(2)))));
        assert!(sub.try_next().is_none());
    }
}
