//! Chunk accumulation shared by the CSV and JSON readers.

use crate::error::{IngestionError, IngestionResult};
use crate::types::{Batch, Record};

// Upper bound on the up-front allocation for a batch; huge chunk sizes grow on demand.
const MAX_PREALLOCATED_ROWS: usize = 4_096;

/// Groups a fallible row iterator into [`Batch`]es of `chunk_size` rows.
///
/// Every batch except possibly the last holds exactly `chunk_size` rows. The first row error
/// is yielded as-is and ends the sequence; rows accumulated before it are dropped.
#[derive(Debug)]
pub struct Batches<S> {
    source: S,
    chunk_size: usize,
    next_sequence: usize,
    finished: bool,
}

impl<S> Batches<S> {
    /// Wrap a row source. A `chunk_size` of 0 is a configuration error.
    pub fn new(source: S, chunk_size: usize) -> IngestionResult<Self> {
        if chunk_size == 0 {
            return Err(IngestionError::config("chunk_size must be at least 1"));
        }
        Ok(Self {
            source,
            chunk_size,
            next_sequence: 0,
            finished: false,
        })
    }

    /// The underlying row source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of batches yielded so far.
    pub fn batches_emitted(&self) -> usize {
        self.next_sequence
    }
}

impl<S> Iterator for Batches<S>
where
    S: Iterator<Item = IngestionResult<Record>>,
{
    type Item = IngestionResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_size.min(MAX_PREALLOCATED_ROWS));
        while rows.len() < self.chunk_size {
            match self.source.next() {
                Some(Ok(row)) => rows.push(row),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        if rows.is_empty() {
            return None;
        }
        let batch = Batch::new(self.next_sequence, rows);
        self.next_sequence += 1;
        Some(Ok(batch))
    }
}
