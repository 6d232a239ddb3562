use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::Database;

use super::{RemoteEvent, RemoteStore, SubscriberHub, Subscription};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

struct Watcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Remote store backed by a SQLite file that several board processes can
/// share. Writes from this process fan out immediately; commits from other
/// processes are picked up by polling the file's data version.
pub struct SqliteRemote {
    db: Database,
    hub: Arc<SubscriberHub>,
    /// Held from a commit (or a watcher read) until its publish, so fan-out
    /// order matches the order the file changed in.
    publish_lock: Arc<AsyncMutex<()>>,
    watcher: Mutex<Option<Watcher>>,
}

impl SqliteRemote {
    /// Opens (creating if needed) the database and starts watching it.
    pub async fn connect(db_path: PathBuf, poll_interval: Duration) -> Result<Arc<Self>> {
        let db = tokio::task::spawn_blocking(move || Database::new(db_path))
            .await
            .context("database open task panicked")??;

        let remote = Arc::new(Self {
            db,
            hub: SubscriberHub::new(),
            publish_lock: Arc::new(AsyncMutex::new(())),
            watcher: Mutex::new(None),
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch_loop(
            remote.db.clone(),
            remote.hub.clone(),
            remote.publish_lock.clone(),
            poll_interval,
            cancel.clone(),
        ));
        *remote.watcher() = Some(Watcher { cancel, handle });

        log_info!("Connected remote store at {}", remote.db.path().display());
        Ok(remote)
    }

    fn watcher(&self) -> MutexGuard<'_, Option<Watcher>> {
        match self.watcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stops watching for foreign commits. Writes keep working; only
    /// cross-process fan-out ends.
    pub async fn disconnect(&self) {
        let watcher = self.watcher().take();
        if let Some(watcher) = watcher {
            watcher.cancel.cancel();
            if let Err(err) = watcher.handle.await {
                log_warn!("Remote watcher ended abnormally: {err}");
            }
            log_info!("Disconnected remote store at {}", self.db.path().display());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.watcher().is_some()
    }

    pub async fn read(&self, path: &str) -> Result<Option<Value>> {
        read_value(&self.db, path).await
    }

    /// Removes the document, as an operator clearing the database would.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let _order = self.publish_lock.lock().await;
        self.db.delete_document(path).await?;
        self.hub.publish(path, RemoteEvent::Snapshot(None));
        Ok(())
    }
}

impl Drop for SqliteRemote {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher().take() {
            watcher.cancel.cancel();
        }
    }
}

async fn read_value(db: &Database, path: &str) -> Result<Option<Value>> {
    db.get_document(path)
        .await?
        .map(|document| document.value())
        .transpose()
}

async fn snapshot_event(db: &Database, path: &str) -> RemoteEvent {
    match read_value(db, path).await {
        Ok(value) => RemoteEvent::Snapshot(value),
        Err(err) => RemoteEvent::Failed(format!("{err:#}")),
    }
}

async fn watch_loop(
    db: Database,
    hub: Arc<SubscriberHub>,
    publish_lock: Arc<AsyncMutex<()>>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_version: Option<i64> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let version = match db.data_version().await {
                    Ok(version) => version,
                    Err(err) => {
                        log_error!("Failed to poll remote store: {err:#}");
                        continue;
                    }
                };
                let changed = last_version.map(|last| last != version).unwrap_or(false);
                last_version = Some(version);
                if !changed {
                    continue;
                }

                for path in hub.paths() {
                    let _order = publish_lock.lock().await;
                    let event = snapshot_event(&db, &path).await;
                    hub.publish(&path, event);
                }
            }
        }
    }
}

#[async_trait]
impl RemoteStore for SqliteRemote {
    fn subscribe(&self, path: &str) -> Subscription {
        let (subscription, revision) = self.hub.register(path);
        let db = self.db.clone();
        let hub = self.hub.clone();
        let id = subscription.id();
        let path = path.to_string();
        tokio::spawn(async move {
            let event = snapshot_event(&db, &path).await;
            hub.deliver_if_current(&path, id, revision, event);
        });
        subscription
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        let raw = serde_json::to_string(&value)
            .with_context(|| format!("failed to serialize value for '{path}'"))?;
        let _order = self.publish_lock.lock().await;
        self.db.put_document(path, raw, Utc::now()).await?;
        self.hub.publish(path, RemoteEvent::Snapshot(Some(value)));
        Ok(())
    }
}
