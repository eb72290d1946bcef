//! CSV chunked reader.
//!
//! Rules:
//!
//! - The first record is the header; its fields become the record keys, in order.
//! - `skip_records` rows after the header are discarded whatever their shape.
//! - Every value stays text. Empty cells are `""`, never null.
//! - Rows whose field count differs from the header (or that are not UTF-8) are skipped and
//!   counted instead of failing the file. JSON input has no such tolerance.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::IngestionResult;
use crate::types::Record;

use super::batch::Batches;
use super::params::{DEFAULT_CHUNK_SIZE, DEFAULT_FIELD_SEPARATOR};

/// Options for [`csv_batches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Rows per batch. Must be at least 1.
    pub chunk_size: usize,
    /// Data rows to drop after the header.
    pub skip_records: u64,
    /// Field separator byte.
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip_records: 0,
            delimiter: DEFAULT_FIELD_SEPARATOR,
        }
    }
}

/// Lazy batch iterator over CSV input.
pub type CsvBatchReader<R> = Batches<CsvRows<R>>;

/// Read CSV from `input` as a lazy sequence of batches.
///
/// The header is read immediately; everything else is read on demand.
pub fn csv_batches<R: Read>(input: R, options: &CsvOptions) -> IngestionResult<CsvBatchReader<R>> {
    Batches::new(CsvRows::new(input, options)?, options.chunk_size)
}

/// Open a local CSV file as a lazy sequence of batches.
pub fn csv_batches_from_path(
    path: impl AsRef<Path>,
    options: &CsvOptions,
) -> IngestionResult<CsvBatchReader<File>> {
    csv_batches(File::open(path)?, options)
}

/// Row-level CSV iterator used by [`CsvBatchReader`].
#[derive(Debug)]
pub struct CsvRows<R> {
    reader: csv::Reader<R>,
    header: Vec<String>,
    record: csv::StringRecord,
    pending_skip: u64,
    malformed: u64,
}

impl<R: Read> CsvRows<R> {
    /// Read the header from `input` and prepare to stream rows.
    pub fn new(input: R, options: &CsvOptions) -> IngestionResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter)
            .from_reader(input);

        let mut record = csv::StringRecord::new();
        let header = if reader.read_record(&mut record)? {
            record
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    if i == 0 {
                        name.trim_start_matches('\u{feff}').to_string()
                    } else {
                        name.to_string()
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            reader,
            header,
            record,
            pending_skip: options.skip_records,
            malformed: 0,
        })
    }
}

impl<R> CsvRows<R> {
    /// Column names, in file order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Rows skipped so far because of a field-count mismatch or invalid UTF-8.
    pub fn malformed_rows(&self) -> u64 {
        self.malformed
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = IngestionResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.header.is_empty() {
            return None;
        }

        if self.pending_skip > 0 {
            let mut skipped = csv::ByteRecord::new();
            while self.pending_skip > 0 {
                match self.reader.read_byte_record(&mut skipped) {
                    Ok(true) => self.pending_skip -= 1,
                    Ok(false) => {
                        self.pending_skip = 0;
                        return None;
                    }
                    Err(e) => return Some(Err(e.into())),
                }
            }
        }

        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) if self.record.len() != self.header.len() => {
                    self.malformed += 1;
                    debug!(
                        line = self.record.position().map(|p| p.line()),
                        fields = self.record.len(),
                        expected = self.header.len(),
                        "skipping csv row with wrong field count"
                    );
                }
                Ok(true) => {
                    let row = self
                        .header
                        .iter()
                        .zip(self.record.iter())
                        .map(|(name, value)| (name.clone(), Value::String(value.to_string())))
                        .collect();
                    return Some(Ok(row));
                }
                Err(e) if is_row_level(&e) => {
                    self.malformed += 1;
                    debug!(error = %e, "skipping unreadable csv row");
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

fn is_row_level(e: &csv::Error) -> bool {
    matches!(
        e.kind(),
        csv::ErrorKind::Utf8 { .. } | csv::ErrorKind::UnequalLengths { .. }
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{csv_batches, CsvOptions};

    fn options(chunk_size: usize, skip_records: u64) -> CsvOptions {
        CsvOptions {
            chunk_size,
            skip_records,
            ..CsvOptions::default()
        }
    }

    #[test]
    fn header_defines_keys_in_order() {
        let input = "name,id,active\nAda,1,true\n";
        let batch = csv_batches(input.as_bytes(), &CsvOptions::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let keys: Vec<&str> = batch.rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "id", "active"]);
        assert_eq!(batch.rows[0]["active"], json!("true"));
    }

    #[test]
    fn empty_cells_are_empty_strings() {
        let input = "a,b,c\n1,,3\n";
        let batch = csv_batches(input.as_bytes(), &CsvOptions::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.rows[0]["b"], json!(""));
    }

    #[test]
    fn skip_counts_rows_after_header_even_malformed_ones() {
        let input = "a,b\nbad\n1,x\n2,y\n";
        let mut reader = csv_batches(input.as_bytes(), &options(10, 1)).unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0]["a"], json!("1"));
        assert_eq!(reader.source().malformed_rows(), 0);
    }

    #[test]
    fn skip_past_end_yields_nothing() {
        let mut reader = csv_batches("a\n1\n2\n".as_bytes(), &options(10, 5)).unwrap();
        assert!(reader.next().is_none());
    }

    #[test]
    fn long_and_short_rows_are_skipped_and_counted() {
        let input = "a,b\n1,2\n3\n4,5,6\n7,8\n";
        let mut reader = csv_batches(input.as_bytes(), &options(1, 0)).unwrap();
        let values: Vec<String> = reader
            .by_ref()
            .map(|b| b.unwrap().rows[0]["a"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["1", "7"]);
        assert_eq!(reader.source().malformed_rows(), 2);
    }

    #[test]
    fn invalid_utf8_row_is_skipped() {
        let mut input = b"a,b\n1,2\n".to_vec();
        input.extend_from_slice(b"\xff\xfe,3\n5,6\n");
        let mut reader = csv_batches(input.as_slice(), &options(10, 0)).unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(reader.source().malformed_rows(), 1);
    }

    #[test]
    fn custom_delimiter_and_quoting() {
        let input = "id|note\n1|\"a|b\"\n";
        let opts = CsvOptions {
            delimiter: b'|',
            ..CsvOptions::default()
        };
        let batch = csv_batches(input.as_bytes(), &opts).unwrap().next().unwrap().unwrap();
        assert_eq!(batch.rows[0]["note"], json!("a|b"));
    }

    #[test]
    fn bom_is_stripped_from_header() {
        let input = "\u{feff}id,name\n1,Ada\n";
        let reader = csv_batches(input.as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(reader.source().header().to_vec(), vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn empty_input_has_no_batches() {
        let mut reader = csv_batches("".as_bytes(), &CsvOptions::default()).unwrap();
        assert!(reader.next().is_none());
    }
}
