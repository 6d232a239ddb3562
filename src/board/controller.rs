use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use log::info;
use tokio::sync::watch;

use crate::{
    models::{FacilityState, ShelfRecord},
    sync::{PendingWrite, RemoteState, RemoteStore, SetValue},
    timer::Clock,
};

use super::FacilityLayout;

/// Operator actions against the shared board. Every action is a functional
/// update of the whole facility state, applied locally at once and pushed to
/// the remote in the background.
pub struct BoardController {
    store: RemoteState<FacilityState>,
    layout: Arc<FacilityLayout>,
    clock: Arc<dyn Clock>,
}

impl BoardController {
    pub fn bind(
        remote: Arc<dyn RemoteStore>,
        state_path: &str,
        layout: Arc<FacilityLayout>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = RemoteState::bind(remote, state_path, layout.initial_state());
        Self {
            store,
            layout,
            clock,
        }
    }

    pub fn layout(&self) -> &FacilityLayout {
        &self.layout
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn snapshot(&self) -> FacilityState {
        self.store.value()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn wait_loaded(&self) {
        self.store.wait_loaded().await;
    }

    pub fn changes(&self) -> watch::Receiver<FacilityState> {
        self.store.changes()
    }

    pub fn shelf(&self, shelf_id: &str) -> Result<ShelfRecord> {
        self.snapshot()
            .shelf(shelf_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown shelf '{shelf_id}'"))
    }

    pub fn start_shelf(&self, shelf_id: &str) -> Result<PendingWrite> {
        if self.shelf(shelf_id)?.is_running() {
            bail!("shelf '{shelf_id}' is already running");
        }
        let now_ms = self.now_ms();
        Ok(self.update_shelf(shelf_id, move |shelf| {
            shelf.start(now_ms);
        }))
    }

    pub fn reset_shelf(&self, shelf_id: &str) -> Result<PendingWrite> {
        self.shelf(shelf_id)?;
        Ok(self.update_shelf(shelf_id, ShelfRecord::reset))
    }

    /// Sets the shown elapsed time to `total_secs` and leaves the shelf running.
    pub fn edit_shelf_time(&self, shelf_id: &str, total_secs: f64) -> Result<PendingWrite> {
        if !total_secs.is_finite() || total_secs < 0.0 {
            bail!("elapsed time must be a non-negative number of seconds");
        }
        self.shelf(shelf_id)?;
        let now_ms = self.now_ms();
        Ok(self.update_shelf(shelf_id, move |shelf| {
            shelf.edit_time(total_secs, now_ms);
        }))
    }

    pub fn assign_station(&self, shelf_id: &str, station_id: &str) -> Result<PendingWrite> {
        if !self.layout.is_valid_station(station_id) {
            bail!("unknown station '{station_id}'");
        }
        self.shelf(shelf_id)?;
        let station_id = station_id.to_string();
        Ok(self.update_shelf(shelf_id, move |shelf| {
            shelf.assign_station(station_id);
        }))
    }

    /// Replaces the whole board with the factory-reset state.
    pub fn reset_all(&self) -> PendingWrite {
        info!("Resetting every shelf on the board");
        self.store.set(self.layout.initial_state())
    }

    pub async fn unbind(self) {
        self.store.unbind().await;
    }

    fn update_shelf<F>(&self, shelf_id: &str, apply: F) -> PendingWrite
    where
        F: FnOnce(&mut ShelfRecord) + Send + 'static,
    {
        let shelf_id = shelf_id.to_string();
        self.store.set(SetValue::update(move |previous: &FacilityState| {
            let Some(mut shelf) = previous.shelf(&shelf_id).cloned() else {
                return previous.clone();
            };
            apply(&mut shelf);
            previous.with_shelf(shelf)
        }))
    }
}
