//! JSON streaming chunked reader.
//!
//! Input is a single top-level array of objects: `[{"a":1}, {"a":2}]`. The array framing is
//! scanned byte by byte and each element is handed to `serde_json`, one at a time, so memory use
//! is bounded by the largest element rather than the file.
//!
//! Number handling: integers that fit in `i64` stay integers; every other number becomes the
//! nearest `f64`. No arbitrary-precision values are produced.
//!
//! Any malformed token aborts the file. Unlike CSV there is no per-row tolerance.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use serde_json::{Number, Value};

use crate::error::{IngestionError, IngestionResult};
use crate::types::Record;

use super::batch::Batches;
use super::params::DEFAULT_CHUNK_SIZE;

/// Options for [`json_batches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonOptions {
    /// Records per batch. Must be at least 1.
    pub chunk_size: usize,
    /// Leading array elements to drop.
    pub skip_records: u64,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip_records: 0,
        }
    }
}

/// Lazy batch iterator over a JSON array.
pub type JsonBatchReader<R> = Batches<JsonRows<R>>;

/// Read a JSON array from `input` as a lazy sequence of batches.
///
/// Nothing is read until the first batch is requested.
pub fn json_batches<R: BufRead>(input: R, options: &JsonOptions) -> IngestionResult<JsonBatchReader<R>> {
    Batches::new(JsonRows::new(input, options), options.chunk_size)
}

/// Open a local JSON file as a lazy sequence of batches.
pub fn json_batches_from_path(
    path: impl AsRef<Path>,
    options: &JsonOptions,
) -> IngestionResult<JsonBatchReader<BufReader<File>>> {
    json_batches(BufReader::new(File::open(path)?), options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the opening `[`.
    Start,
    /// After `[`, before the first element.
    First,
    /// After an element.
    Next,
    /// Closing `]` seen, or an error was returned.
    Done,
}

/// Element-level JSON iterator used by [`JsonBatchReader`].
#[derive(Debug)]
pub struct JsonRows<R> {
    input: R,
    offset: u64,
    state: State,
    pending_skip: u64,
    elements: u64,
}

/// Counts the bytes `serde_json` pulls out of the shared input.
struct Counted<'a, R> {
    inner: &'a mut R,
    offset: &'a mut u64,
}

impl<R: Read> Read for Counted<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        *self.offset += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> JsonRows<R> {
    /// Prepare to stream the elements of the array in `input`.
    pub fn new(input: R, options: &JsonOptions) -> Self {
        Self {
            input,
            offset: 0,
            state: State::Start,
            pending_skip: options.skip_records,
            elements: 0,
        }
    }

    /// Array elements parsed so far, including skipped ones.
    pub fn elements_read(&self) -> u64 {
        self.elements
    }

    fn error_at(&self, offset: u64, message: impl Into<String>) -> IngestionError {
        IngestionError::Json {
            offset,
            message: message.into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> IngestionError {
        self.error_at(self.offset, message)
    }

    fn peek(&mut self) -> IngestionResult<Option<u8>> {
        Ok(self.input.fill_buf()?.first().copied())
    }

    fn bump(&mut self) {
        self.input.consume(1);
        self.offset += 1;
    }

    /// Skip whitespace and peek at the next significant byte.
    fn skip_whitespace(&mut self) -> IngestionResult<Option<u8>> {
        loop {
            match self.peek()? {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.bump(),
                other => return Ok(other),
            }
        }
    }

    fn next_element(&mut self) -> IngestionResult<Option<Record>> {
        match self.state {
            State::Done => return Ok(None),
            State::Start => match self.skip_whitespace()? {
                Some(b'[') => {
                    self.bump();
                    self.state = State::First;
                }
                Some(_) => return Err(self.error("expected '[' at start of input")),
                None => return Err(self.error("empty input, expected a json array")),
            },
            State::First | State::Next => {}
        }

        let at_end = match (self.state, self.skip_whitespace()?) {
            (_, None) => return Err(self.error("unterminated array")),
            (_, Some(b']')) => true,
            (State::Next, Some(b',')) => {
                self.bump();
                false
            }
            (State::Next, Some(_)) => return Err(self.error("expected ',' or ']' after array element")),
            _ => false,
        };

        if at_end {
            self.bump();
            self.state = State::Done;
            return match self.skip_whitespace()? {
                None => Ok(None),
                Some(_) => Err(self.error("trailing characters after top-level array")),
            };
        }

        self.state = State::Next;
        let index = self.elements;
        self.elements += 1;
        // An object ends at its own `}`, so serde_json never reads past the element.
        match self.skip_whitespace()? {
            Some(b'{') => {}
            Some(_) => return Err(self.error(format!("array element {index} is not an object"))),
            None => return Err(self.error("unterminated array")),
        }

        let start = self.offset;
        let reader = Counted {
            inner: &mut self.input,
            offset: &mut self.offset,
        };
        let parsed = {
            let mut de = serde_json::Deserializer::from_reader(reader);
            Value::deserialize(&mut de)
        };
        let mut value = parsed.map_err(|e| self.error(format!("array element {index}: {e}")))?;
        normalize_numbers(&mut value);
        match value {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(self.error_at(start, format!("array element {index} is not an object"))),
        }
    }
}

impl<R: BufRead> Iterator for JsonRows<R> {
    type Item = IngestionResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = match self.next_element() {
                Ok(Some(record)) => record,
                Ok(None) => return None,
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            };
            if self.pending_skip > 0 {
                self.pending_skip -= 1;
                continue;
            }
            return Some(Ok(item));
        }
    }
}

/// Rewrite every number in `value` so integers outside `i64` become the nearest `f64`.
pub fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) if n.as_i64().is_none() && !n.is_f64() => {
            if let Some(f) = n.as_f64().and_then(Number::from_f64) {
                *n = f;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use serde_json::{json, Value};

    use super::{json_batches, normalize_numbers, JsonOptions};
    use crate::error::IngestionError;
    use crate::types::Record;

    fn all_rows(input: &str, skip_records: u64) -> Result<Vec<Record>, IngestionError> {
        let opts = JsonOptions {
            chunk_size: 2,
            skip_records,
        };
        let mut rows = Vec::new();
        for batch in json_batches(input.as_bytes(), &opts)? {
            rows.extend(batch?.rows);
        }
        Ok(rows)
    }

    #[test]
    fn elements_become_records_with_source_key_order() {
        let rows = all_rows(r#"[{"z":1,"a":{"nested":[true,null]}}, {"b":"x"}]"#, 0).unwrap();
        assert_eq!(rows.len(), 2);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(rows[0]["a"], json!({"nested": [true, null]}));
        assert_eq!(rows[1]["b"], json!("x"));
    }

    #[test]
    fn decimals_become_nearest_f64() {
        let rows = all_rows(r#"[{"v":3.14000000000000012,"i":42,"e":1e3,"big":18446744073709551616}]"#, 0).unwrap();
        assert_eq!(rows[0]["v"].as_f64(), Some(3.14000000000000012_f64));
        assert!(rows[0]["v"].is_f64());
        assert_eq!(rows[0]["i"], json!(42));
        assert!(rows[0]["i"].is_i64());
        assert_eq!(rows[0]["e"].as_f64(), Some(1000.0));
        assert!(rows[0]["big"].is_f64());
    }

    #[test]
    fn skip_drops_leading_elements() {
        let rows = all_rows(r#"[{"a":1},{"a":2},{"a":3}]"#, 1).unwrap();
        let values: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        assert_eq!(values, vec![json!({"a":2}), json!({"a":3})]);
    }

    #[test]
    fn empty_array_has_no_batches() {
        assert!(all_rows(" [ ] \n", 0).unwrap().is_empty());
    }

    #[test]
    fn strings_with_escapes_and_unicode() {
        let rows = all_rows(r#"[{"s":"a\"b\\c\né😀","raw":"naïve"}]"#, 0).unwrap();
        assert_eq!(rows[0]["s"], json!("a\"b\\c\né😀"));
        assert_eq!(rows[0]["raw"], json!("naïve"));
    }

    #[test]
    fn strings_spanning_buffer_refills() {
        let long = "x".repeat(10_000);
        let input = format!(r#"[{{"s":"{long}"}}]"#);
        let reader = BufReader::with_capacity(16, input.as_bytes());
        let batch = json_batches(reader, &JsonOptions::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.rows[0]["s"].as_str().map(str::len), Some(10_000));
    }

    #[test]
    fn malformed_input_is_fatal() {
        for bad in [
            "",
            "{}",
            r#"[{"a":1},]"#,
            r#"[{"a":1} {"a":2}]"#,
            r#"[{"a":1}"#,
            r#"[{"a":tru}]"#,
            r#"[{"a":01}]"#,
            r#"[{"a":"unterminated}]"#,
            r#"[{"a":1}] extra"#,
            r#"[1, 2]"#,
            r#"[{"a":1e400}]"#,
        ] {
            let err = all_rows(bad, 0).unwrap_err();
            assert!(matches!(err, IngestionError::Json { .. }), "input {bad:?} gave {err}");
        }
    }

    #[test]
    fn error_stops_the_stream_after_good_batches() {
        let opts = JsonOptions {
            chunk_size: 1,
            skip_records: 0,
        };
        let results: Vec<_> = json_batches(r#"[{"a":1},{"a":2},oops]"#.as_bytes(), &opts)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let input = format!("[{{\"a\":{}1{}}}]", "[".repeat(200), "]".repeat(200));
        assert!(all_rows(&input, 0).is_err());
    }

    #[test]
    fn large_unsigned_integers_become_floats() {
        let mut value = json!({"max": i64::MAX, "over": u64::MAX, "list": [u64::MAX, -1]});
        normalize_numbers(&mut value);
        assert!(value["max"].is_i64());
        assert!(value["over"].is_f64());
        assert!(value["list"][0].is_f64());
        assert_eq!(value["list"][1], json!(-1));
    }

    #[test]
    fn parse_errors_carry_the_failing_offset() {
        let input = r#"[{"a":1}, {"a": [1, 2,]}]"#;
        match all_rows(input, 0).unwrap_err() {
            IngestionError::Json { offset, message } => {
                assert!(offset >= 20, "offset {offset}");
                assert!(message.starts_with("array element 1:"), "{message}");
                assert!(message.contains("line 1"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn element_parsing_leaves_following_bytes_for_the_framing() {
        // Each element is parsed independently; whitespace and separators between them are framing.
        let rows = all_rows("[\n  {\"a\":{\"b\":[1,{}]}}\n ,\t{\"a\":2}  \n]\n", 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["a"], json!({"b": [1, {}]}));
        assert_eq!(rows[1]["a"], json!(2));
    }
}
