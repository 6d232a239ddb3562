use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::storage::{LocalStorage, StorageEvent};

use super::SetValue;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

/// A value persisted under `key` in same-device storage and kept in step
/// with changes other handles make to that key.
pub struct LocalState<T> {
    key: String,
    origin: Uuid,
    storage: Arc<dyn LocalStorage>,
    value: Arc<watch::Sender<T>>,
    cancel: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl<T> LocalState<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Reads the stored value synchronously; a missing or unreadable entry
    /// yields `initial`.
    pub fn bind(storage: Arc<dyn LocalStorage>, key: impl Into<String>, initial: T) -> Self {
        let key = key.into();
        let origin = Uuid::new_v4();
        let current = read_stored(storage.as_ref(), &key).unwrap_or_else(|| initial.clone());
        let (value, _) = watch::channel(current);
        let value = Arc::new(value);

        let cancel = CancellationToken::new();
        let events = storage.watch();
        let listener = tokio::spawn(listen(
            storage.clone(),
            events,
            key.clone(),
            origin,
            initial,
            value.clone(),
            cancel.clone(),
        ));

        Self {
            key,
            origin,
            storage,
            value,
            cancel,
            listener: Some(listener),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    pub fn changes(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }

    /// Persists the new value, then adopts it. If persisting fails the
    /// previous value stays in place and the error is returned.
    pub fn set(&self, update: impl Into<SetValue<T>>) -> Result<()> {
        let update = update.into();
        let mut outcome = Ok(());
        self.value.send_if_modified(|current| {
            let next = update.apply(current);
            let persisted = serde_json::to_string(&next)
                .with_context(|| format!("failed to serialize '{}'", self.key))
                .and_then(|raw| self.storage.set(&self.key, &raw, Some(self.origin)));
            match persisted {
                Ok(()) => {
                    *current = next;
                    true
                }
                Err(err) => {
                    log_error!("Error writing '{}' to local storage: {err:#}", self.key);
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }

    pub async fn unbind(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.listener.take() {
            let _ = handle.await;
        }
    }
}

impl<T> Drop for LocalState<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn read_stored<T: DeserializeOwned>(storage: &dyn LocalStorage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            log_error!("Error reading '{key}' from local storage: {err:#}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            log_error!("Error parsing stored value for '{key}': {err}");
            None
        }
    }
}

async fn listen<T>(
    storage: Arc<dyn LocalStorage>,
    mut events: broadcast::Receiver<StorageEvent>,
    key: String,
    origin: Uuid,
    initial: T,
    value: Arc<watch::Sender<T>>,
    cancel: CancellationToken,
) where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(StorageEvent { key: changed, new_value, origin: source }) => {
                if changed != key || source == Some(origin) {
                    continue;
                }
                match new_value {
                    Some(raw) => match serde_json::from_str::<T>(&raw) {
                        Ok(next) => {
                            value.send_replace(next);
                        }
                        Err(err) => {
                            log_error!("Error parsing storage event value for '{key}': {err}");
                        }
                    },
                    None => {
                        value.send_replace(initial.clone());
                    }
                }
            }
            Err(RecvError::Lagged(missed)) => {
                log_warn!("Missed {missed} storage events; re-reading '{key}'");
                let current = read_stored(storage.as_ref(), &key).unwrap_or_else(|| initial.clone());
                value.send_replace(current);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
