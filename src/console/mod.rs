//! Line-oriented operator console over the board.

pub mod commands;
pub mod render;

use std::collections::HashMap;

use anyhow::Result;
use log::info;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::{
    board::{grid_view, tv_view, BoardController, TimeEntry, ViewPrefs},
    models::{parse_shelf_id, FacilityState},
    sync::{LocalState, PendingWrite, SetValue},
    timer::{Thresholds, TickEvent, TimerController, TimerReading},
};

pub use commands::{Command, ShelfRef, HELP};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

enum Flow {
    Continue,
    Quit,
}

pub struct Console {
    board: BoardController,
    prefs: LocalState<ViewPrefs>,
    timers: TimerController,
    thresholds: Thresholds,
    live: HashMap<String, TimerReading>,
    last_write: Option<PendingWrite>,
}

impl Console {
    pub fn new(
        board: BoardController,
        prefs: LocalState<ViewPrefs>,
        timers: TimerController,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            board,
            prefs,
            timers,
            thresholds,
            live: HashMap::new(),
            last_write: None,
        }
    }

    pub fn board(&self) -> &BoardController {
        &self.board
    }

    /// Serves commands from `input` until `quit` or end of input, while
    /// following remote changes and timer ticks.
    pub async fn run<R, W>(
        &mut self,
        input: R,
        out: &mut W,
        mut ticks: mpsc::UnboundedReceiver<TickEvent>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut changes = self.board.changes();

        if self.board.is_loading() {
            write_out(out, "Loading board...\n").await?;
            self.board.wait_loaded().await;
        }
        let state = changes.borrow_and_update().clone();
        self.on_state(&state);
        write_out(out, "Board ready. Type 'help' for commands.\n").await?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if let Flow::Quit = self.handle_line(&line, out).await? {
                        break;
                    }
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        log_warn!("Board state channel closed; leaving console");
                        break;
                    }
                    let state = changes.borrow_and_update().clone();
                    self.on_state(&state);
                }
                Some(event) = ticks.recv() => {
                    self.on_tick(event, out).await?;
                }
            }
        }
        Ok(())
    }

    /// Waits for the last queued remote write, then releases every handle.
    pub async fn shutdown(mut self) {
        self.timers.shutdown();
        if let Some(pending) = self.last_write.take() {
            if let Err(err) = pending.wait().await {
                log_warn!("Last board write did not reach the remote: {err:#}");
            }
        }
        self.board.unbind().await;
        self.prefs.unbind().await;
        log_info!("Console closed");
    }

    fn on_state(&mut self, state: &FacilityState) {
        self.timers.reconcile(state);
        self.live
            .retain(|id, _| state.shelf(id).is_some_and(|shelf| shelf.is_running()));
    }

    async fn on_tick<W>(&mut self, event: TickEvent, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let TickEvent { shelf_id, reading } = event;
        let previous = self.live.get(&shelf_id).map(|reading| reading.tier);
        if previous.is_some_and(|tier| reading.tier > tier) {
            let name = match parse_shelf_id(&shelf_id) {
                Some((rack, position)) => format!("rack {rack} shelf {position}"),
                None => shelf_id.clone(),
            };
            info!("{shelf_id} reached {} at {}", reading.tier.as_str(), reading.display);
            write_out(
                out,
                &format!("! {name} is now {} ({})\n", reading.tier.as_str(), reading.display),
            )
            .await?;
        }
        self.live.insert(shelf_id, reading);
        Ok(())
    }

    async fn handle_line<W>(&mut self, line: &str, out: &mut W) -> Result<Flow>
    where
        W: AsyncWrite + Unpin,
    {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(err) => {
                write_out(out, &format!("error: {err:#}\n")).await?;
                return Ok(Flow::Continue);
            }
        };

        match self.execute(command) {
            Ok(Some(text)) => write_out(out, &text).await?,
            Ok(None) => return Ok(Flow::Quit),
            Err(err) => write_out(out, &format!("error: {err:#}\n")).await?,
        }
        Ok(Flow::Continue)
    }

    /// Runs one command and returns what to print, or `None` to quit.
    fn execute(&mut self, command: Command) -> Result<Option<String>> {
        let text = match command {
            Command::Grid => {
                let groups = grid_view(
                    &self.board.snapshot(),
                    self.board.layout(),
                    self.board.now_ms(),
                    &self.thresholds,
                );
                render::render_grid(&groups, &self.live)
            }
            Command::Tv => {
                let sort = self.prefs.value().tv_sort;
                let view = tv_view(&self.board.snapshot(), self.board.now_ms(), &self.thresholds, sort);
                render::render_tv(&view, sort)
            }
            Command::Sort(sort) => {
                self.prefs.set(SetValue::update(move |prefs: &ViewPrefs| ViewPrefs {
                    tv_sort: sort,
                    ..prefs.clone()
                }))?;
                format!("TV sort is now {}\n", sort.as_str())
            }
            Command::Start(shelf) => {
                self.track(self.board.start_shelf(&shelf.id())?);
                format!("Started rack {} shelf {}\n", shelf.rack, shelf.position)
            }
            Command::Reset(shelf) => {
                self.track(self.board.reset_shelf(&shelf.id())?);
                format!("Reset rack {} shelf {}\n", shelf.rack, shelf.position)
            }
            Command::Edit {
                shelf,
                hours,
                minutes,
            } => {
                let mut entry = TimeEntry::default();
                entry.type_hours(&hours);
                entry.type_minutes(&minutes);
                self.track(self.board.edit_shelf_time(&shelf.id(), entry.total_seconds())?);
                format!(
                    "Rack {} shelf {} set to {}:{}\n",
                    shelf.rack,
                    shelf.position,
                    pad(entry.hours()),
                    pad(entry.minutes())
                )
            }
            Command::Station { shelf, station } => {
                self.track(self.board.assign_station(&shelf.id(), &station)?);
                let label = if station.is_empty() { "none" } else { station.as_str() };
                format!("Rack {} shelf {} station: {label}\n", shelf.rack, shelf.position)
            }
            Command::ResetAll => {
                self.track(self.board.reset_all());
                "Every shelf reset\n".to_string()
            }
            Command::Help => format!("{HELP}\n"),
            Command::Quit => return Ok(None),
        };
        Ok(Some(text))
    }

    fn track(&mut self, pending: PendingWrite) {
        self.last_write = Some(pending);
    }
}

fn pad(field: &str) -> String {
    format!("{field:0>2}")
}

async fn write_out<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
