use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{is_blank, RemoteEvent, RemoteStore, SetValue, Subscription};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_anomaly, log_error, log_info};

struct WriteJob {
    value: Value,
    done: Option<oneshot::Sender<Result<()>>>,
}

/// Serialized values this handle has queued but not yet seen come back.
#[derive(Default)]
struct InFlight {
    values: Mutex<VecDeque<Value>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Value>> {
        match self.values.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn push(&self, value: Value) {
        self.lock().push_back(value);
    }

    fn forget(&self, value: &Value) {
        let mut values = self.lock();
        if let Some(index) = values.iter().position(|queued| queued == value) {
            values.remove(index);
        }
    }

    /// True when `snapshot` echoes one of our writes that a later queued
    /// write already supersedes. Acknowledged writes are dropped either way.
    fn is_stale_echo(&self, snapshot: &Value) -> bool {
        let mut values = self.lock();
        match values.iter().position(|queued| queued == snapshot) {
            Some(index) => {
                values.drain(..=index);
                !values.is_empty()
            }
            None => false,
        }
    }
}

/// Outcome of a write that was already applied locally.
pub struct PendingWrite {
    outcome: oneshot::Receiver<Result<()>>,
}

impl PendingWrite {
    fn finished(result: Result<()>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { outcome: rx }
    }

    /// Waits for the remote to accept or reject the write. The local value
    /// is unaffected either way.
    pub async fn wait(self) -> Result<()> {
        self.outcome
            .await
            .map_err(|_| anyhow!("remote writer stopped before the write completed"))?
    }
}

/// A value bound to a remote path.
///
/// The local copy is authoritative for reads and is updated synchronously
/// by [`RemoteState::set`]; the remote is written in the background in
/// submission order. Remote changes from any client replace the local copy,
/// except that once data has loaded an empty remote value is ignored.
pub struct RemoteState<T> {
    path: String,
    value: Arc<watch::Sender<T>>,
    loading: Arc<watch::Sender<bool>>,
    writes: mpsc::UnboundedSender<WriteJob>,
    in_flight: Arc<InFlight>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl<T> RemoteState<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Subscribes to `path`. Until the first notification arrives the value
    /// is `initial` and [`is_loading`](Self::is_loading) is true.
    pub fn bind(remote: Arc<dyn RemoteStore>, path: impl Into<String>, initial: T) -> Self {
        let path = path.into();
        let (value, _) = watch::channel(initial.clone());
        let (loading, _) = watch::channel(true);
        let value = Arc::new(value);
        let loading = Arc::new(loading);

        let in_flight = Arc::new(InFlight::default());
        let (writes, write_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(
            remote.clone(),
            path.clone(),
            write_rx,
            in_flight.clone(),
        ));

        let subscription = remote.subscribe(&path);
        let cancel = CancellationToken::new();
        let pump = Pump {
            path: path.clone(),
            initial,
            value: value.clone(),
            loading: loading.clone(),
            writes: writes.clone(),
            in_flight: in_flight.clone(),
            initial_load: true,
        };
        let handle = tokio::spawn(pump.run(subscription, cancel.clone()));

        Self {
            path,
            value,
            loading,
            writes,
            in_flight,
            cancel,
            pump: Some(handle),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Resolves once the first notification (or a read error) came in.
    pub async fn wait_loaded(&self) {
        let mut loading = self.loading.subscribe();
        let _ = loading.wait_for(|is_loading| !*is_loading).await;
    }

    /// Receiver that observes every local value change.
    pub fn changes(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }

    /// Applies `update` locally right away, then queues the whole new value
    /// for the remote. A failed write is logged and never rolled back.
    pub fn set(&self, update: impl Into<SetValue<T>>) -> PendingWrite {
        let update = update.into();
        let mut next = None;
        self.value.send_modify(|current| {
            let value = update.apply(current);
            *current = value.clone();
            next = Some(value);
        });

        let serialized = next
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .with_context(|| format!("failed to serialize value for '{}'", self.path));
        let value = match serialized {
            Ok(Some(value)) => value,
            Ok(None) => return PendingWrite::finished(Ok(())),
            Err(err) => {
                log_error!("Remote write to '{}' skipped: {err:#}", self.path);
                return PendingWrite::finished(Err(err));
            }
        };

        let (done, outcome) = oneshot::channel();
        self.in_flight.push(value.clone());
        let job = WriteJob {
            value,
            done: Some(done),
        };
        if let Err(mpsc::error::SendError(job)) = self.writes.send(job) {
            self.in_flight.forget(&job.value);
            log_error!("Remote writer for '{}' is gone; write dropped", self.path);
            return PendingWrite::finished(Err(anyhow!("remote writer for '{}' is gone", self.path)));
        }
        PendingWrite { outcome }
    }

    /// Stops listening for remote changes. Queued writes still complete.
    pub async fn unbind(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.pump.take() {
            let _ = handle.await;
        }
    }
}

impl<T> Drop for RemoteState<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn write_loop(
    remote: Arc<dyn RemoteStore>,
    path: String,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    in_flight: Arc<InFlight>,
) {
    while let Some(job) = jobs.recv().await {
        let result = remote.write(&path, job.value.clone()).await;
        if let Err(err) = &result {
            log_error!("Remote write to '{path}' failed: {err:#}");
            in_flight.forget(&job.value);
        }
        if let Some(done) = job.done {
            let _ = done.send(result);
        }
    }
}

struct Pump<T> {
    path: String,
    initial: T,
    value: Arc<watch::Sender<T>>,
    loading: Arc<watch::Sender<bool>>,
    writes: mpsc::UnboundedSender<WriteJob>,
    in_flight: Arc<InFlight>,
    initial_load: bool,
}

impl<T> Pump<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn run(mut self, mut subscription: Subscription, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = subscription.next() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        subscription.unsubscribe();
    }

    fn handle(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Snapshot(snapshot) => {
                self.apply_snapshot(snapshot);
                self.initial_load = false;
            }
            RemoteEvent::Failed(reason) => {
                log_error!("Remote read of '{}' failed: {reason}", self.path);
            }
        }
        self.loading.send_if_modified(|loading| std::mem::replace(loading, false));
    }

    fn apply_snapshot(&mut self, snapshot: Option<Value>) {
        match snapshot.filter(|value| !is_blank(value)) {
            Some(raw) if self.in_flight.is_stale_echo(&raw) => {
                log::debug!("Skipping echo of a superseded write to '{}'", self.path);
            }
            Some(raw) => match serde_json::from_value::<T>(raw) {
                Ok(next) => {
                    self.value.send_replace(next);
                }
                Err(err) => {
                    log_error!("Discarding unreadable value at '{}': {err}", self.path);
                }
            },
            None if self.initial_load => {
                log_info!("No data at path '{}'. Initializing with default state.", self.path);
                match serde_json::to_value(&self.initial) {
                    Ok(value) => {
                        self.in_flight.push(value.clone());
                        let _ = self.writes.send(WriteJob { value, done: None });
                    }
                    Err(err) => {
                        log_error!("Failed to serialize default state for '{}': {err}", self.path);
                    }
                }
                self.value.send_replace(self.initial.clone());
            }
            None => {
                log_anomaly!(
                    "Remote value at '{}' went empty after initial load; keeping last good state",
                    self.path
                );
            }
        }
    }
}
