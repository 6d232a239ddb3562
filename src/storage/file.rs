use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{LocalStorage, StorageBus, StorageEvent};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const DEBOUNCE: Duration = Duration::from_millis(50);
const EXTENSION: &str = ".json";

/// Last contents seen per key, so the watcher only announces changes this
/// instance didn't make itself.
type Known = Arc<Mutex<HashMap<String, Option<String>>>>;

fn lock_known(known: &Known) -> MutexGuard<'_, HashMap<String, Option<String>>> {
    match known.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn read_file(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// One file per key under a directory. Other processes using the same
/// directory are followed through a file watcher; their changes arrive on
/// [`LocalStorage::watch`] with no origin.
pub struct FileStorage {
    dir: PathBuf,
    bus: StorageBus,
    known: Known,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory {}", dir.display()))?;

        let bus = StorageBus::default();
        let known: Known = Arc::default();
        let watcher_bus = bus.clone();
        let watcher_known = known.clone();
        let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        announce_external(&event.path, &watcher_known, &watcher_bus);
                    }
                }
                Err(err) => log_warn!("Storage watcher error: {err}"),
            }
        })
        .context("Failed to create storage watcher")?;
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch storage directory {}", dir.display()))?;
        log_info!("Watching storage directory {}", dir.display());

        Ok(Self {
            dir,
            bus,
            known,
            _debouncer: debouncer,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if !valid_key(key) {
            bail!("invalid storage key '{key}'");
        }
        Ok(self.dir.join(format!("{key}{EXTENSION}")))
    }
}

/// Publishes the current contents of a changed `<key>.json` unless they
/// match what was last seen for that key.
fn announce_external(path: &Path, known: &Known, bus: &StorageBus) {
    let Some(key) = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(EXTENSION))
    else {
        return;
    };
    if !valid_key(key) {
        return;
    }

    let mut known = lock_known(known);
    let contents = match read_file(path) {
        Ok(contents) => contents,
        Err(err) => {
            log_warn!("Failed to read changed storage file {}: {err}", path.display());
            return;
        }
    };
    if known.get(key) == Some(&contents) {
        return;
    }
    known.insert(key.to_string(), contents.clone());
    bus.publish(key, contents, None);
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        read_file(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn set(&self, key: &str, value: &str, origin: Option<Uuid>) -> Result<()> {
        let path = self.key_path(key)?;
        let staging = path.with_extension("json.tmp");
        let mut known = lock_known(&self.known);
        fs::write(&staging, value)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        known.insert(key.to_string(), Some(value.to_string()));
        self.bus.publish(key, Some(value.to_string()), origin);
        Ok(())
    }

    fn remove(&self, key: &str, origin: Option<Uuid>) -> Result<()> {
        let path = self.key_path(key)?;
        let mut known = lock_known(&self.known);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to remove {}", path.display()))
            }
        }
        known.insert(key.to_string(), None);
        self.bus.publish(key, None, origin);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.bus.subscribe()
    }
}
