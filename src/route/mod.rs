// src/route/mod.rs
//! Moves a processed source file to its success or error destination.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::pipeline::FileOutcome;

/// Reason tag for files where at least one batch block failed.
const BLOCK_ERRORS_REASON: &str = "error in some BH blocks";

/// Routes files after their outcome is decided. Relocation failures are
/// logged and not retried; they never change the decided outcome, so every
/// entry point here is infallible from the caller's view.
pub struct OutcomeRouter {
    success_dir: PathBuf,
    error_dir: PathBuf,
}

impl OutcomeRouter {
    pub fn new(success_dir: impl Into<PathBuf>, error_dir: impl Into<PathBuf>) -> Self {
        Self {
            success_dir: success_dir.into(),
            error_dir: error_dir.into(),
        }
    }

    /// Route `file` by its aggregate outcome.
    pub fn route(&self, file: &Path, outcome: &FileOutcome) {
        if outcome.succeeded() {
            self.to_success(file);
        } else {
            error!(
                file = %file.display(),
                "failing blocks: {}",
                outcome.describe_failures()
            );
            self.to_error(file, BLOCK_ERRORS_REASON);
        }
    }

    pub fn to_success(&self, file: &Path) {
        self.relocate(file, &self.success_dir, "success".to_string());
    }

    /// Move to the error folder, tagging the reason. `reason` also covers
    /// upstream failures such as "invalid file format" and "file read
    /// error" for files that never reached block processing.
    pub fn to_error(&self, file: &Path, reason: &str) {
        self.relocate(file, &self.error_dir, format!("error ({reason})"));
    }

    fn relocate(&self, file: &Path, dest_dir: &Path, label: String) {
        match move_file(file, dest_dir) {
            Ok(target) => info!(file = %target.display(), "file moved to {label} folder"),
            Err(err) => error!(file = %file.display(), "failed to move file: {err:#}"),
        }
    }
}

/// Move `file` into `dest_dir`, creating the directory if needed and
/// replacing any existing file with the same name.
fn move_file(file: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .with_context(|| format!("source path {:?} has no file name", file))?;

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating destination folder {:?}", dest_dir))?;

    let target = dest_dir.join(name);
    if target.exists() {
        fs::remove_file(&target)
            .with_context(|| format!("replacing existing file {:?}", target))?;
    }
    fs::rename(file, &target)
        .with_context(|| format!("moving {:?} to {:?}", file, target))?;

    Ok(target)
}
