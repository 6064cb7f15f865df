use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::countdown::{
    DEFAULT_RELEASE_MAX_MS, DEFAULT_RELEASE_MIN_MS, DEFAULT_STAGE_COUNT,
    DEFAULT_STAGE_INTERVAL_MS,
};
use crate::history::view::{LIST_WINDOW, TREND_WINDOW};
use crate::solve_timer::DEFAULT_SAMPLE_INTERVAL_MS;

/// Most lights the countdown will show
pub const MAX_STAGE_COUNT: u8 = 9;
/// Upper bound for every interval and delay setting
pub const MAX_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub stage_interval_ms: u64,
    pub stage_count: u8,
    pub release_min_ms: u64,
    pub release_max_ms: u64,
    pub sample_interval_ms: u64,
    pub list_window: usize,
    pub trend_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stage_interval_ms: DEFAULT_STAGE_INTERVAL_MS,
            stage_count: DEFAULT_STAGE_COUNT,
            release_min_ms: DEFAULT_RELEASE_MIN_MS,
            release_max_ms: DEFAULT_RELEASE_MAX_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            list_window: LIST_WINDOW,
            trend_window: TREND_WINDOW,
        }
    }
}

impl Config {
    /// Replace nonsensical values with defaults, logging each one
    pub fn validated(mut self) -> Self {
        let defaults = Config::default();

        if self.stage_interval_ms == 0 || self.stage_interval_ms > MAX_INTERVAL_MS {
            tracing::warn!(
                value = self.stage_interval_ms,
                "stage_interval_ms must be in 1..={MAX_INTERVAL_MS}, using default"
            );
            self.stage_interval_ms = defaults.stage_interval_ms;
        }
        if self.stage_count == 0 || self.stage_count > MAX_STAGE_COUNT {
            tracing::warn!(
                value = self.stage_count,
                "stage_count must be in 1..={MAX_STAGE_COUNT}, using default"
            );
            self.stage_count = defaults.stage_count;
        }
        if self.sample_interval_ms == 0 || self.sample_interval_ms > MAX_INTERVAL_MS {
            tracing::warn!(
                value = self.sample_interval_ms,
                "sample_interval_ms must be in 1..={MAX_INTERVAL_MS}, using default"
            );
            self.sample_interval_ms = defaults.sample_interval_ms;
        }
        if self.release_max_ms <= self.release_min_ms || self.release_max_ms > MAX_INTERVAL_MS {
            tracing::warn!(
                min = self.release_min_ms,
                max = self.release_max_ms,
                "release range must be non-empty and end by {MAX_INTERVAL_MS}ms, using default"
            );
            self.release_min_ms = defaults.release_min_ms;
            self.release_max_ms = defaults.release_max_ms;
        }
        if self.list_window == 0 {
            self.list_window = defaults.list_window;
        }
        if self.trend_window == 0 {
            self.trend_window = defaults.trend_window;
        }
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("lightsout_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg.validated(),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "ignoring unreadable config: {e}");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
