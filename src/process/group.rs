// src/process/group.rs
//! Groups a flat row sequence into batch blocks delimited by `BH`/`BI`.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::process::{BatchBlock, RawRecord, RecordTag};

/// Minimum field count for a row to take part in grouping at all.
const MIN_FIELDS: usize = 4;

/// Scan `rows` in order and rebuild the batch blocks, keyed by batch number.
///
/// Grouping never fails: malformed input yields incomplete or missing
/// blocks, and the validator is the pass that rejects those. Rules:
///
/// - rows with fewer than 4 fields are dropped without touching the
///   open-block state;
/// - `BH` opens a fresh block under its batch number (a repeated batch
///   number replaces the earlier block, last one wins) and is the block's
///   first member;
/// - every row seen while a block is open is appended to it;
/// - `BI` is appended and then closes the block;
/// - rows arriving with no open block are silently discarded.
pub fn group_blocks(rows: Vec<RawRecord>) -> BTreeMap<i64, BatchBlock> {
    let mut blocks: BTreeMap<i64, BatchBlock> = BTreeMap::new();
    let mut open: Option<i64> = None;

    for record in rows {
        if record.fields.len() < MIN_FIELDS {
            debug!(line = record.source_line, "dropping short row");
            continue;
        }

        if record.tag == RecordTag::BatchHeader {
            match record.field(1).and_then(|s| s.parse::<i64>().ok()) {
                Some(batch_number) => {
                    if blocks.contains_key(&batch_number) {
                        warn!(batch_number, "repeated batch header, replacing earlier block");
                    }
                    blocks.insert(
                        batch_number,
                        BatchBlock {
                            batch_number,
                            records: Vec::new(),
                        },
                    );
                    open = Some(batch_number);
                }
                None => {
                    warn!(
                        line = record.source_line,
                        "batch header without a numeric batch number, dropped"
                    );
                    continue;
                }
            }
        }

        let closes = record.tag == RecordTag::BatchTrailer;

        if let Some(batch_number) = open {
            if let Some(block) = blocks.get_mut(&batch_number) {
                block.records.push(record);
            }
        }

        if closes {
            open = None;
        }
    }

    blocks
}
