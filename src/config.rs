use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{board::FacilityLayout, timer::Thresholds};

pub const CONFIG_ENV: &str = "BURNIN_CONFIG";
pub const DEBUG_ENV: &str = "BURNIN_DEBUG";
pub const DEFAULT_CONFIG_FILE: &str = "burnin-board.json";

/// Remote path of the shared facility document.
pub const DEFAULT_STATE_PATH: &str = "dashboardState";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardConfig {
    pub database_path: PathBuf,
    pub state_path: String,
    pub storage_dir: PathBuf,
    pub thresholds: Thresholds,
    pub layout: FacilityLayout,
    pub tick_interval_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("burnin-board.sqlite3"),
            state_path: DEFAULT_STATE_PATH.into(),
            storage_dir: PathBuf::from("burnin-prefs"),
            thresholds: Thresholds::default(),
            layout: FacilityLayout::default(),
            tick_interval_ms: 1000,
            poll_interval_ms: 500,
        }
    }
}

impl BoardConfig {
    /// A missing file means defaults; anything unreadable or invalid is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads from `$BURNIN_CONFIG`, or `burnin-board.json` in the working directory.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        self.layout.validate()?;
        if self.state_path.trim().is_empty() {
            bail!("statePath must not be empty");
        }
        if self.tick_interval_ms == 0 || self.poll_interval_ms == 0 {
            bail!("tickIntervalMs and pollIntervalMs must be positive");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
