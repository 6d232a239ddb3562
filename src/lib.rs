pub mod board;
pub mod config;
pub mod console;
mod db;
pub mod models;
pub mod storage;
pub mod sync;
pub mod timer;
pub mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{error, info};
use tokio::io::BufReader;

use board::{BoardController, ViewPrefs};
use config::BoardConfig;
use console::Console;
use storage::FileStorage;
use sync::{LocalState, SqliteRemote};
use timer::{Clock, SystemClock, TimerController};

/// Storage key of this device's display preferences.
pub const VIEW_PREFS_KEY: &str = "viewPrefs";

pub fn run() {
    utils::logging::init(config::debug_from_env());
    info!("Burn-in board starting up...");

    if let Err(err) = start() {
        error!("Burn-in board stopped: {err:#}");
        std::process::exit(1);
    }
}

fn start() -> Result<()> {
    let config = BoardConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(serve(config));
    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn serve(config: BoardConfig) -> Result<()> {
    let remote = SqliteRemote::connect(config.database_path.clone(), config.poll_interval())
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let board = BoardController::bind(
        remote.clone(),
        &config.state_path,
        Arc::new(config.layout.clone()),
        clock.clone(),
    );

    let storage = Arc::new(FileStorage::new(config.storage_dir.clone())?);
    let prefs = LocalState::bind(storage, VIEW_PREFS_KEY, ViewPrefs::default());
    let (timers, ticks) = TimerController::new(clock, config.thresholds, config.tick_interval());

    let mut console = Console::new(board, prefs, timers, config.thresholds);
    let mut stdout = tokio::io::stdout();
    let result = console
        .run(BufReader::new(tokio::io::stdin()), &mut stdout, ticks)
        .await;

    console.shutdown().await;
    remote.disconnect().await;
    info!("Burn-in board shut down");
    result
}
