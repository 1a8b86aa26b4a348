// src/config.rs
//! Runtime configuration, loaded from a YAML file with sane defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Drop folder the scanner watches.
    pub incoming_dir: PathBuf,
    pub success_dir: PathBuf,
    pub error_dir: PathBuf,
    /// SQLite database file for persisted batch records.
    pub database_path: PathBuf,
    pub scan_interval_secs: u64,
    /// Width of the block worker pool, shared across all files.
    pub worker_count: usize,
    /// Deadline for a single block's persistence attempt.
    pub block_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            incoming_dir: "incoming".into(),
            success_dir: "success".into(),
            error_dir: "error".into(),
            database_path: "batchdrop.sqlite3".into(),
            scan_interval_secs: 20,
            worker_count: 5,
            block_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from `path`. A missing file runs the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {:?}", path))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config file {:?}", path))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_secs(self.block_timeout_secs)
    }
}
