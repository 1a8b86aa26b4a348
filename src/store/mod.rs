// src/store/mod.rs
//! SQLite-backed persistence for validated batch records.
//!
//! One call to [`BatchStore::persist_block`] is one transaction: either
//! every insert for the block lands or none do.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::process::{RawRecord, RecordTag};

/// Dates in the batch format are `MM/dd/yyyy`.
const DATE_FORMAT: &str = "%m/%d/%Y";

/// Block-scoped persistence failures, surfaced to the orchestrator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("duplicate key {key}")]
    DuplicateKey {
        key: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid data format at line {line}: {detail}")]
    InvalidDataFormat { line: usize, detail: String },

    #[error("unexpected persistence failure")]
    Unexpected(#[from] sqlx::Error),
}

/// Parsed `BH` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchHeaderRow {
    pub batch_no: i64,
    pub batch_date: NaiveDate,
    pub location: String,
}

/// Parsed `TH` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnHeaderRow {
    pub tran_ref_no: i64,
    pub txn_date: NaiveDate,
    pub txn_amount: f64,
}

/// Parsed `TI` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnItemRow {
    pub item_no: i64,
    pub description: String,
    pub amount: f64,
}

impl BatchHeaderRow {
    fn parse(record: &RawRecord) -> Result<Self, PersistenceError> {
        Ok(Self {
            batch_no: numeric_field(record, 1)?,
            batch_date: date_field(record, 2)?,
            location: text_field(record, 3)?.to_string(),
        })
    }
}

impl TxnHeaderRow {
    fn parse(record: &RawRecord) -> Result<Self, PersistenceError> {
        Ok(Self {
            tran_ref_no: numeric_field(record, 1)?,
            txn_date: date_field(record, 2)?,
            txn_amount: decimal_field(record, 3)?,
        })
    }
}

impl TxnItemRow {
    fn parse(record: &RawRecord) -> Result<Self, PersistenceError> {
        Ok(Self {
            item_no: numeric_field(record, 1)?,
            description: text_field(record, 2)?.to_string(),
            amount: decimal_field(record, 3)?,
        })
    }
}

/// Handle to the batch store. Cheap to clone; worker tasks share the pool.
#[derive(Clone)]
pub struct BatchStore {
    pool: SqlitePool,
}

impl BatchStore {
    /// Open or create the database at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store directory {:?}", parent))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .with_context(|| format!("opening batch store at {:?}", path))?;

        let store = Self { pool };
        store
            .ensure_schema()
            .await
            .context("creating batch store schema")?;
        info!(path = %path.display(), "batch store opened");
        Ok(store)
    }

    async fn ensure_schema(&self) -> sqlx::Result<()> {
        // WAL mode so concurrent block writers don't trip over each other
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS batch_header (
                batch_no   INTEGER PRIMARY KEY,
                batch_date DATE NOT NULL,
                location   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS txn_header (
                tran_ref_no INTEGER PRIMARY KEY,
                txn_date    DATE NOT NULL,
                txn_amount  REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS txn_item (
                item_no     INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                amount      REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist every record of one block inside a single transaction.
    ///
    /// Insert order follows record order in the source file. Any failure
    /// returns before the commit and the dropped transaction rolls back, so
    /// no partial block is ever observable.
    pub async fn persist_block(&self, records: &[RawRecord]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            match &record.tag {
                RecordTag::BatchHeader => {
                    let row = BatchHeaderRow::parse(record)?;
                    sqlx::query(
                        "INSERT INTO batch_header (batch_no, batch_date, location) VALUES (?, ?, ?)",
                    )
                    .bind(row.batch_no)
                    .bind(row.batch_date)
                    .bind(&row.location)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| translate_insert_error(e, row.batch_no))?;
                }
                RecordTag::TransactionHeader => {
                    let row = TxnHeaderRow::parse(record)?;
                    sqlx::query(
                        "INSERT INTO txn_header (tran_ref_no, txn_date, txn_amount) VALUES (?, ?, ?)",
                    )
                    .bind(row.tran_ref_no)
                    .bind(row.txn_date)
                    .bind(row.txn_amount)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| translate_insert_error(e, row.tran_ref_no))?;
                }
                RecordTag::TransactionItem => {
                    let row = TxnItemRow::parse(record)?;
                    sqlx::query(
                        "INSERT INTO txn_item (item_no, description, amount) VALUES (?, ?, ?)",
                    )
                    .bind(row.item_no)
                    .bind(&row.description)
                    .bind(row.amount)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| translate_insert_error(e, row.item_no))?;
                }
                // Trailers are consumed by validation; nothing to store.
                RecordTag::BatchTrailer => {}
                RecordTag::Unknown(tag) => {
                    warn!(tag = %tag, line = record.source_line, "unknown record tag, skipping");
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn table_count(&self, table: &str) -> i64 {
        let sql = match table {
            "batch_header" => "SELECT COUNT(*) FROM batch_header",
            "txn_header" => "SELECT COUNT(*) FROM txn_header",
            "txn_item" => "SELECT COUNT(*) FROM txn_item",
            other => panic!("unknown table {other}"),
        };
        sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .expect("count query")
    }
}

fn translate_insert_error(err: sqlx::Error, key: i64) -> PersistenceError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return PersistenceError::DuplicateKey { key, source: err };
        }
    }
    PersistenceError::Unexpected(err)
}

fn numeric_field(record: &RawRecord, idx: usize) -> Result<i64, PersistenceError> {
    let raw = text_field(record, idx)?;
    raw.parse()
        .map_err(|_| PersistenceError::InvalidDataFormat {
            line: record.source_line,
            detail: format!("expected an integer in field {idx}, got `{raw}`"),
        })
}

fn decimal_field(record: &RawRecord, idx: usize) -> Result<f64, PersistenceError> {
    let raw = text_field(record, idx)?;
    raw.parse()
        .map_err(|_| PersistenceError::InvalidDataFormat {
            line: record.source_line,
            detail: format!("expected a decimal amount in field {idx}, got `{raw}`"),
        })
}

fn date_field(record: &RawRecord, idx: usize) -> Result<NaiveDate, PersistenceError> {
    let raw = text_field(record, idx)?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| PersistenceError::InvalidDataFormat {
        line: record.source_line,
        detail: format!("expected a MM/dd/yyyy date in field {idx}, got `{raw}`"),
    })
}

fn text_field(record: &RawRecord, idx: usize) -> Result<&str, PersistenceError> {
    record
        .field(idx)
        .ok_or_else(|| PersistenceError::InvalidDataFormat {
            line: record.source_line,
            detail: format!("field {idx} is missing or blank"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::test_support::records;
    use tempfile::TempDir;

    async fn open_temp_store() -> (TempDir, BatchStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = BatchStore::open(dir.path().join("batches.sqlite3"))
            .await
            .expect("open store");
        (dir, store)
    }

    #[tokio::test]
    async fn persists_a_complete_block() {
        let (_dir, store) = open_temp_store().await;
        let block = records(&[
            &["BH", "1", "01/01/2024", "NYC"],
            &["TH", "20", "01/01/2024", "9.99"],
            &["TI", "10", "coffee", "5.00"],
            &["BI", "1", "1", ""],
        ]);

        store.persist_block(&block).await.expect("persist");

        assert_eq!(store.table_count("batch_header").await, 1);
        assert_eq!(store.table_count("txn_header").await, 1);
        assert_eq!(store.table_count("txn_item").await, 1);
    }

    #[tokio::test]
    async fn rolls_back_the_whole_block_on_parse_failure() {
        let (_dir, store) = open_temp_store().await;
        let block = records(&[
            &["BH", "1", "01/01/2024", "NYC"],
            &["TI", "10", "coffee", "5.00"],
            &["TH", "20", "not-a-date", "9.99"],
        ]);

        let err = store.persist_block(&block).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidDataFormat { .. }));

        // nothing from the block survived, including the earlier inserts
        assert_eq!(store.table_count("batch_header").await, 0);
        assert_eq!(store.table_count("txn_item").await, 0);
    }

    #[tokio::test]
    async fn translates_unique_violations_to_duplicate_key() {
        let (_dir, store) = open_temp_store().await;
        let first = records(&[&["BH", "1", "01/01/2024", "NYC"]]);
        store.persist_block(&first).await.expect("persist");

        let second = records(&[&["BH", "1", "02/02/2024", "BOS"]]);
        let err = store.persist_block(&second).await.unwrap_err();
        assert!(matches!(err, PersistenceError::DuplicateKey { key: 1, .. }));

        // the first block's row is untouched
        assert_eq!(store.table_count("batch_header").await, 1);
    }

    #[tokio::test]
    async fn duplicate_within_one_block_rolls_everything_back() {
        let (_dir, store) = open_temp_store().await;
        let block = records(&[
            &["TI", "10", "coffee", "5.00"],
            &["TI", "10", "refill", "1.00"],
        ]);

        let err = store.persist_block(&block).await.unwrap_err();
        assert!(matches!(err, PersistenceError::DuplicateKey { key: 10, .. }));
        assert_eq!(store.table_count("txn_item").await, 0);
    }

    #[tokio::test]
    async fn trailers_and_unknown_tags_store_nothing() {
        let (_dir, store) = open_temp_store().await;
        let block = records(&[
            &["BI", "1", "0", ""],
            &["ZZ", "1", "2", "3"],
            &["TI", "10", "coffee", "5.00"],
        ]);

        store.persist_block(&block).await.expect("persist");

        assert_eq!(store.table_count("batch_header").await, 0);
        assert_eq!(store.table_count("txn_header").await, 0);
        assert_eq!(store.table_count("txn_item").await, 1);
    }

    #[tokio::test]
    async fn rejects_malformed_amounts() {
        let (_dir, store) = open_temp_store().await;
        let block = records(&[&["TI", "10", "coffee", "five dollars"]]);

        let err = store.persist_block(&block).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidDataFormat { .. }));
    }
}
