//! Core data model types for ingestion.
//!
//! Files are read into [`Record`]s which are grouped into [`Batch`]es and handed to the
//! backing store one batch at a time.

use std::fmt;

/// One input row (CSV) or array element (JSON).
///
/// Field order follows the source: CSV header order, or JSON key order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A bounded, ordered group of records submitted to the backing store in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Zero-based position of this batch within its file.
    pub sequence: usize,
    /// Records in source order.
    pub rows: Vec<Record>,
}

impl Batch {
    /// Create a batch from its sequence number and rows.
    pub fn new(sequence: usize, rows: Vec<Record>) -> Self {
        Self { sequence, rows }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Delimited text with a header row.
    Csv,
    /// A single top-level JSON array of objects.
    Json,
}

impl FileFormat {
    /// Parse a declared `type` value (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Sniff the format from the suffixes of a file name.
    ///
    /// `.json` wins over `.csv` when both appear (e.g. `dump.csv.json.gz`). Returns `None`
    /// when neither suffix is present.
    pub fn sniff(file_name: &str) -> Option<Self> {
        let suffixes: Vec<String> = file_name
            .trim_start_matches('.')
            .split('.')
            .skip(1)
            .map(|s| s.to_ascii_lowercase())
            .collect();

        if suffixes.iter().any(|s| s == "json") {
            Some(Self::Json)
        } else if suffixes.iter().any(|s| s == "csv") {
            Some(Self::Csv)
        } else {
            None
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Compression applied to the raw byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain bytes.
    #[default]
    None,
    /// gzip (multi-member streams are supported).
    Gzip,
    /// zip archive; only the first file entry is read.
    Zip,
}

impl Compression {
    /// Parse a declared `compression` value (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "gzip" => Some(Self::Gzip),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
            Self::Zip => write!(f, "zip"),
        }
    }
}
