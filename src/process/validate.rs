// src/process/validate.rs
//! Structural validation of one batch block.

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::process::{BatchBlock, RawRecord, RecordTag};

/// The closed set of structural failures a block can be rejected for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown record type `{tag}` at line {line}")]
    UnknownRecordType { tag: String, line: usize },

    #[error("missing or unusable key field at line {line}")]
    MissingField { line: usize },

    #[error("batch trailer references unknown batch number {batch_number}")]
    UnknownBatchReference { batch_number: i64 },

    #[error("batch {batch_number} declares {declared} items but contains {counted}")]
    ItemCountMismatch {
        batch_number: i64,
        declared: i64,
        counted: i64,
    },
}

/// Check one block's records in order.
///
/// Maintains a batch-number → running item count table so the trailer's
/// declared count can be cross-checked against what the block actually
/// carries. The batch numbers are re-derived from record content here even
/// though grouping already keyed the block; this pass is the authoritative
/// check. Purely structural: dates and amounts are the persister's problem.
pub fn validate_block(block: &BatchBlock) -> Result<(), ValidationError> {
    let mut item_counts: HashMap<i64, i64> = HashMap::new();
    let mut current: Option<i64> = None;

    for record in &block.records {
        match &record.tag {
            RecordTag::BatchHeader => {
                // Registering again restarts the counter.
                let batch_number = numeric_field(record, 1)?;
                item_counts.insert(batch_number, 0);
                current = Some(batch_number);
            }
            RecordTag::TransactionHeader => {}
            RecordTag::TransactionItem => {
                if let Some(batch_number) = current {
                    *item_counts.entry(batch_number).or_insert(0) += 1;
                }
            }
            RecordTag::BatchTrailer => {
                let batch_number = numeric_field(record, 1)?;
                let declared = numeric_field(record, 2)?;

                let counted = item_counts
                    .remove(&batch_number)
                    .ok_or(ValidationError::UnknownBatchReference { batch_number })?;
                if counted != declared {
                    return Err(ValidationError::ItemCountMismatch {
                        batch_number,
                        declared,
                        counted,
                    });
                }
                // Tracking for this batch number is done; nothing further
                // is expected for it within this block.
                current = None;
            }
            RecordTag::Unknown(tag) if tag.trim().is_empty() => {
                return Err(ValidationError::MissingField {
                    line: record.source_line,
                });
            }
            RecordTag::Unknown(tag) => {
                return Err(ValidationError::UnknownRecordType {
                    tag: tag.clone(),
                    line: record.source_line,
                });
            }
        }
    }

    debug!(batch_number = block.batch_number, "block validated");
    Ok(())
}

fn numeric_field(record: &RawRecord, idx: usize) -> Result<i64, ValidationError> {
    record
        .field(idx)
        .and_then(|s| s.parse().ok())
        .ok_or(ValidationError::MissingField {
            line: record.source_line,
        })
}
