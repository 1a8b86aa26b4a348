// src/source/mod.rs
//! Drop-folder scanning and CSV decoding.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::process::RawRecord;

/// File-scoped failures that stop a file before block processing.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("not a CSV file")]
    NotCsv,

    #[error("failed to read file")]
    Unreadable(#[source] csv::Error),
}

impl IngestionError {
    /// Machine-stable tag used when routing the file to the error folder.
    pub fn reason_tag(&self) -> &'static str {
        match self {
            IngestionError::NotCsv => "invalid file format",
            IngestionError::Unreadable(_) => "file read error",
        }
    }
}

/// True when the file name carries the `.csv` suffix the pipeline accepts.
pub fn is_csv_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".csv"))
        .unwrap_or(false)
}

/// List the regular files currently sitting in `dir`, sorted by name so a
/// scan pass is deterministic.
pub fn scan_folder(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("scanning folder {:?}", dir))? {
        let entry = entry.with_context(|| format!("reading folder entry in {:?}", dir))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Decode the whole file into tagged records.
///
/// The reader is headerless and flexible: rows keep whatever field count
/// the file gives them, and downstream passes decide what to do with short
/// or unknown rows. Line positions come from the CSV reader so diagnostics
/// point at the real source line.
pub fn read_rows(path: &Path) -> Result<Vec<RawRecord>, IngestionError> {
    if !is_csv_file(path) {
        return Err(IngestionError::NotCsv);
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(IngestionError::Unreadable)?;

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(IngestionError::Unreadable)?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 1);
        let fields: Vec<String> = record.iter().map(|s| s.to_string()).collect();
        rows.push(RawRecord::from_fields(fields, line));
    }

    debug!(path = %path.display(), rows = rows.len(), "file decoded");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordTag;
    use tempfile::TempDir;

    #[test]
    fn reads_tagged_rows_with_line_positions() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("batch.csv");
        fs::write(
            &file,
            "BH,1,01/01/2024,NYC\nTI,10,\"coffee, large\",5.00\nBI,1,1,\n",
        )
        .expect("write");

        let rows = read_rows(&file).expect("read");

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].tag, RecordTag::BatchHeader);
        assert_eq!(rows[0].source_line, 1);
        // quoted commas stay inside one field
        assert_eq!(rows[1].field(2), Some("coffee, large"));
        assert_eq!(rows[2].tag, RecordTag::BatchTrailer);
        assert_eq!(rows[2].fields.len(), 4);
    }

    #[test]
    fn keeps_rows_with_uneven_field_counts() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("ragged.csv");
        fs::write(&file, "BH,1,01/01/2024,NYC\nBI,1,1\n").expect("write");

        let rows = read_rows(&file).expect("read");
        assert_eq!(rows[1].fields.len(), 3);
    }

    #[test]
    fn rejects_non_csv_names() {
        let err = read_rows(Path::new("batch.txt")).unwrap_err();
        assert!(matches!(err, IngestionError::NotCsv));
        assert_eq!(err.reason_tag(), "invalid file format");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_rows(Path::new("nope/missing.csv")).unwrap_err();
        assert!(matches!(err, IngestionError::Unreadable(_)));
        assert_eq!(err.reason_tag(), "file read error");
    }

    #[test]
    fn scan_lists_files_but_not_directories() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("b.csv"), "x").expect("write");
        fs::write(dir.path().join("a.txt"), "x").expect("write");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");

        let files = scan_folder(dir.path()).expect("scan");

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert!(files[1].ends_with("b.csv"));
        assert!(is_csv_file(&files[1]));
        assert!(!is_csv_file(&files[0]));
    }
}
