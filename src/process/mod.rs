// src/process/mod.rs
//! Record model plus the grouping and validation passes.
//!
//! A batch file is a flat sequence of tagged CSV rows. `group` rebuilds the
//! nested batch-block structure, `validate` checks one block's internal
//! consistency. Neither pass touches the store.

pub mod group;
pub mod validate;

pub use group::group_blocks;
pub use validate::{validate_block, ValidationError};

/// Record-type tag carried in the first CSV field.
///
/// The set of known tags is closed; anything else is `Unknown` and carries
/// the raw tag text so diagnostics can show what the file actually said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordTag {
    /// `BH`: opens a batch block.
    BatchHeader,
    /// `TH`: a transaction header inside a block.
    TransactionHeader,
    /// `TI`: a transaction item, counted against the open batch.
    TransactionItem,
    /// `BI`: batch trailer carrying the declared item count; closes a block.
    BatchTrailer,
    /// Anything else, including a blank tag.
    Unknown(String),
}

impl RecordTag {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "BH" => RecordTag::BatchHeader,
            "TH" => RecordTag::TransactionHeader,
            "TI" => RecordTag::TransactionItem,
            "BI" => RecordTag::BatchTrailer,
            other => RecordTag::Unknown(other.to_string()),
        }
    }
}

/// One decoded CSV row. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub tag: RecordTag,
    /// The full row as decoded, tag text at index 0. Data fields for every
    /// known tag sit at indices 1..=3.
    pub fields: Vec<String>,
    /// 1-based line position in the source file, for diagnostics.
    pub source_line: usize,
}

impl RawRecord {
    pub fn from_fields(fields: Vec<String>, source_line: usize) -> Self {
        let tag = fields
            .first()
            .map(|s| RecordTag::parse(s))
            .unwrap_or_else(|| RecordTag::Unknown(String::new()));
        RawRecord {
            tag,
            fields,
            source_line,
        }
    }

    /// Field at `idx`, trimmed; `None` when absent or blank.
    pub fn field(&self, idx: usize) -> Option<&str> {
        self.fields
            .get(idx)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// The contiguous record run from one `BH` to its matching `BI`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchBlock {
    pub batch_number: i64,
    pub records: Vec<RawRecord>,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_parsing_covers_known_set() {
        assert_eq!(RecordTag::parse("BH"), RecordTag::BatchHeader);
        assert_eq!(RecordTag::parse("TH"), RecordTag::TransactionHeader);
        assert_eq!(RecordTag::parse("TI"), RecordTag::TransactionItem);
        assert_eq!(RecordTag::parse("BI"), RecordTag::BatchTrailer);
        assert_eq!(RecordTag::parse("XX"), RecordTag::Unknown("XX".to_string()));
        // whitespace around the tag is not significant
        assert_eq!(RecordTag::parse(" BH "), RecordTag::BatchHeader);
        assert_eq!(RecordTag::parse(""), RecordTag::Unknown(String::new()));
    }

    #[test]
    fn field_access_trims_and_skips_blanks() {
        let rec = test_support::record(&["TI", " 10 ", "", "5.00"], 3);
        assert_eq!(rec.field(1), Some("10"));
        assert_eq!(rec.field(2), None);
        assert_eq!(rec.field(3), Some("5.00"));
        assert_eq!(rec.field(9), None);
    }
}
