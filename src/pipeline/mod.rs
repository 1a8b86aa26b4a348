// src/pipeline/mod.rs
//! Per-file orchestration: one task per batch block on a bounded worker
//! pool, a wait-all join, and the aggregate file outcome.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::process::{self, BatchBlock, ValidationError};
use crate::route::OutcomeRouter;
use crate::source;
use crate::store::{BatchStore, PersistenceError};

/// Why one block failed. Block failures never abort sibling blocks.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("block processing timed out")]
    TimedOut,

    #[error("block task faulted: {0}")]
    Faulted(String),
}

/// Verdict for one block's validation-and-persistence attempt.
#[derive(Debug)]
pub struct BlockOutcome {
    pub batch_number: i64,
    pub error: Option<BlockError>,
}

impl BlockOutcome {
    fn ok(batch_number: i64) -> Self {
        Self {
            batch_number,
            error: None,
        }
    }

    fn failed(batch_number: i64, error: BlockError) -> Self {
        Self {
            batch_number,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate verdict for a whole file.
#[derive(Debug)]
pub struct FileOutcome {
    pub outcomes: Vec<BlockOutcome>,
}

impl FileOutcome {
    /// True iff every block outcome succeeded. A file with no blocks at all
    /// trivially succeeds; its rows were all discarded by grouping.
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(BlockOutcome::succeeded)
    }

    /// The failing batch numbers with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (i64, &BlockError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (o.batch_number, e)))
    }

    pub fn describe_failures(&self) -> String {
        self.failures()
            .map(|(batch_number, err)| format!("batch {batch_number}: {err}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runs a file's blocks as independent tasks on a bounded worker pool.
///
/// The pool width is fixed at construction and shared across every file
/// the orchestrator processes; it is not sized per file. Width 1 gives a
/// deterministic single-worker variant for tests.
pub struct BatchOrchestrator {
    store: BatchStore,
    workers: Arc<Semaphore>,
    block_timeout: Duration,
}

impl BatchOrchestrator {
    pub fn new(store: BatchStore, worker_count: usize, block_timeout: Duration) -> Self {
        Self {
            store,
            workers: Arc::new(Semaphore::new(worker_count)),
            block_timeout,
        }
    }

    /// Process every block of one file and aggregate the outcomes.
    ///
    /// Blocks run concurrently up to the pool width; the call returns only
    /// after every submitted task finished (a slow or failed block never
    /// cancels its siblings). A panicking task is captured as a `Faulted`
    /// outcome rather than propagated. Blocks that committed stay committed
    /// even when a sibling fails; the file outcome is a routing signal,
    /// not a cross-block transaction.
    #[instrument(level = "info", skip(self, blocks), fields(file = %file_name, blocks = blocks.len()))]
    pub async fn process_blocks(
        &self,
        file_name: &str,
        blocks: BTreeMap<i64, BatchBlock>,
    ) -> FileOutcome {
        let mut handles = Vec::with_capacity(blocks.len());
        for (batch_number, block) in blocks {
            let store = self.store.clone();
            let workers = Arc::clone(&self.workers);
            let block_timeout = self.block_timeout;
            handles.push((
                batch_number,
                tokio::spawn(async move {
                    let _permit = workers.acquire_owned().await.expect("worker pool closed");
                    run_block(store, block, block_timeout).await
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (batch_number, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(batch_number, "block task faulted: {err}");
                    BlockOutcome::failed(batch_number, BlockError::Faulted(err.to_string()))
                }
            };
            outcomes.push(outcome);
        }

        FileOutcome { outcomes }
    }

    /// Full single-file pass: read, group, process, route.
    ///
    /// Ingestion failures route the file to error straight away with the
    /// upstream reason tag; nothing is grouped or validated for them.
    pub async fn process_path(&self, router: &OutcomeRouter, path: &Path) {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let rows = match source::read_rows(path) {
            Ok(rows) => rows,
            Err(err) => {
                error!(file = %file_name, "ingestion failed: {err}");
                router.to_error(path, err.reason_tag());
                return;
            }
        };

        let blocks = process::group_blocks(rows);
        let outcome = self.process_blocks(&file_name, blocks).await;
        router.route(path, &outcome);
    }
}

async fn run_block(store: BatchStore, block: BatchBlock, block_timeout: Duration) -> BlockOutcome {
    let batch_number = block.batch_number;

    if let Err(err) = process::validate_block(&block) {
        warn!(batch_number, "validation failed: {err}");
        return BlockOutcome::failed(batch_number, BlockError::Validation(err));
    }

    match tokio::time::timeout(block_timeout, store.persist_block(&block.records)).await {
        Ok(Ok(())) => {
            info!(batch_number, records = block.records.len(), "block persisted");
            BlockOutcome::ok(batch_number)
        }
        Ok(Err(err)) => {
            error!(batch_number, "persistence failed: {err}");
            BlockOutcome::failed(batch_number, BlockError::Persistence(err))
        }
        Err(_) => {
            error!(batch_number, timeout = ?block_timeout, "block timed out");
            BlockOutcome::failed(batch_number, BlockError::TimedOut)
        }
    }
}
