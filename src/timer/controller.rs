use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::debug;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{FacilityState, ShelfRecord};

use super::{Clock, Thresholds, TimerReading};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    pub shelf_id: String,
    pub reading: TimerReading,
}

/// What a ticker was armed with; a change means the ticker must restart.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TickerKey {
    start_ms: i64,
    manual_offset: f64,
}

impl TickerKey {
    fn of(shelf: &ShelfRecord) -> Option<Self> {
        shelf.start_time.map(|start_ms| Self {
            start_ms,
            manual_offset: shelf.manual_offset,
        })
    }
}

struct ArmedTicker {
    key: TickerKey,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ArmedTicker {
    fn disarm(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

#[derive(Default)]
struct TickerSet {
    armed: Mutex<HashMap<String, ArmedTicker>>,
}

impl TickerSet {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ArmedTicker>> {
        match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn clear(&self) {
        for (_, ticker) in self.lock().drain() {
            ticker.disarm();
        }
    }
}

impl Drop for TickerSet {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Drives the once-per-interval recomputation of every running shelf's
/// timer. Idle shelves have no ticker; their reading never changes.
#[derive(Clone)]
pub struct TimerController {
    tickers: Arc<TickerSet>,
    events: mpsc::UnboundedSender<TickEvent>,
    clock: Arc<dyn Clock>,
    thresholds: Thresholds,
    tick_interval: Duration,
}

impl TimerController {
    pub fn new(
        clock: Arc<dyn Clock>,
        thresholds: Thresholds,
        tick_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TickEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            tickers: Arc::new(TickerSet::default()),
            events,
            clock,
            thresholds,
            tick_interval,
        };
        (controller, events_rx)
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Arms, re-arms or disarms tickers so exactly the running shelves of
    /// `state` tick, each with its current start time and offset.
    pub fn reconcile(&self, state: &FacilityState) {
        let mut armed = self.tickers.lock();
        let mut wanted: HashMap<&str, TickerKey> = HashMap::new();
        for shelf in state.shelves() {
            if let Some(key) = TickerKey::of(shelf) {
                wanted.insert(shelf.id.as_str(), key);
            }
        }

        let stale: Vec<String> = armed
            .iter()
            .filter(|(id, ticker)| wanted.get(id.as_str()) != Some(&ticker.key))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(ticker) = armed.remove(&id) {
                debug!("Disarming ticker for {id}");
                ticker.disarm();
            }
        }

        for (id, key) in wanted {
            if armed.contains_key(id) {
                continue;
            }
            debug!("Arming ticker for {id}");
            let ticker = self.spawn_ticker(id.to_string(), key);
            armed.insert(id.to_string(), ticker);
        }
    }

    pub fn armed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tickers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn shutdown(&self) {
        self.tickers.clear();
    }

    fn spawn_ticker(&self, shelf_id: String, key: TickerKey) -> ArmedTicker {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let events = self.events.clone();
        let clock = self.clock.clone();
        let thresholds = self.thresholds;
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let reading = TimerReading::at(
                            Some(key.start_ms),
                            key.manual_offset,
                            clock.now_ms(),
                            &thresholds,
                        );
                        let event = TickEvent { shelf_id: shelf_id.clone(), reading };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        ArmedTicker { key, cancel, handle }
    }
}
