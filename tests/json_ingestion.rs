use std::io::{self, BufReader, Read};

use graph_ingest::ingestion::json::{json_batches, json_batches_from_path, JsonOptions};
use graph_ingest::IngestionError;
use serde_json::{json, Value};

fn options(chunk_size: usize, skip_records: u64) -> JsonOptions {
    JsonOptions {
        chunk_size,
        skip_records,
    }
}

#[test]
fn json_from_path_keeps_nesting() {
    let rows: Vec<Value> = json_batches_from_path("tests/fixtures/people.json", &JsonOptions::default())
        .unwrap()
        .flat_map(|b| b.unwrap().rows)
        .map(Value::Object)
        .collect();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["tags"], json!(["math", "engines"]));
    assert_eq!(rows[1]["address"]["city"], json!("Arlington"));
    assert!(rows[0]["id"].is_i64());
    assert!(rows[1]["score"].is_f64());
}

#[test]
fn json_end_to_end_skip_one_chunk_two() {
    let input = r#"[{"a":1},{"a":2},{"a":3}]"#;
    let batches: Vec<_> = json_batches(input.as_bytes(), &options(2, 1))
        .unwrap()
        .map(Result::unwrap)
        .collect();

    assert_eq!(batches.len(), 1);
    let rows: Vec<Value> = batches[0].rows.iter().cloned().map(Value::Object).collect();
    assert_eq!(rows, vec![json!({"a": 2}), json!({"a": 3})]);
}

#[test]
fn json_batch_sizes_follow_chunk_size() {
    let input = format!(
        "[{}]",
        (0..7).map(|i| format!(r#"{{"i":{i}}}"#)).collect::<Vec<_>>().join(",")
    );
    let sizes: Vec<usize> = json_batches(input.as_bytes(), &options(3, 0))
        .unwrap()
        .map(|b| b.unwrap().len())
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);
}

#[test]
fn json_decimal_is_nearest_double() {
    let input = r#"[{"pi": 3.14000000000000012}]"#;
    let batch = json_batches(input.as_bytes(), &JsonOptions::default())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    let value = &batch.rows[0]["pi"];
    assert!(value.is_f64());
    assert_eq!(value.as_f64(), Some(3.14000000000000012_f64));
    assert_eq!(value.as_f64(), Some(3.14));
}

#[test]
fn json_malformed_token_aborts_the_file() {
    let input = r#"[{"a":1},{"a":2},{"a":}]"#;
    let results: Vec<_> = json_batches(input.as_bytes(), &options(1, 0)).unwrap().collect();
    assert_eq!(results.len(), 3);
    let err = results.into_iter().last().unwrap().unwrap_err();
    match err {
        IngestionError::Json { offset, .. } => assert!(offset > 15),
        other => panic!("unexpected error: {other}"),
    }
}

/// Yields one byte per read and fails if the reader pulls far past the first element.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.limit {
            return Err(io::Error::other("read past the limit"));
        }
        if self.pos >= self.data.len() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[self.pos];
        self.pos += 1;
        Ok(1)
    }
}

#[test]
fn json_is_read_incrementally() {
    let mut data = br#"[{"a":1},"#.to_vec();
    data.extend(std::iter::repeat_n(b' ', 1_000_000));
    data.extend_from_slice(br#"{"a":2}]"#);
    let trickle = Trickle {
        data,
        pos: 0,
        limit: 64,
    };

    let mut batches = json_batches(BufReader::with_capacity(8, trickle), &options(1, 0)).unwrap();
    let first = batches.next().unwrap().unwrap();
    assert_eq!(first.rows[0]["a"], json!(1));
}

#[test]
fn json_zero_chunk_size_is_rejected() {
    let err = json_batches("[]".as_bytes(), &options(0, 0)).unwrap_err();
    assert!(matches!(err, IngestionError::Config { .. }), "{err}");
}
