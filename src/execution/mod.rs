//! Batch execution against the backing store.
//!
//! Each batch is bound as one list parameter ([`BATCH_PARAMETER`]) and submitted with the file's
//! query. Submission blocks until the store acknowledges the call; there is never more than one
//! outstanding write per file.
//!
//! [`BatchExecutor::drive`] runs a whole file either sequentially or pipelined: in pipelined mode
//! a scoped parser thread prepares the next batch while the current one executes, handing it over
//! through a rendezvous channel so at most one parsed batch waits.

mod metrics;

use std::panic;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::IngestionResult;
use crate::store::{GraphStore, Parameters};
use crate::types::Batch;

pub use metrics::{ExecutionMetrics, ExecutionMetricsSnapshot};

/// Name of the list parameter that carries a batch's records.
pub const BATCH_PARAMETER: &str = "rows";

/// How batches of one file are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Parse a batch, execute it, repeat.
    #[default]
    Sequential,
    /// Parse the next batch on a helper thread while the current one executes.
    Pipelined,
}

impl ExecutionMode {
    pub fn from_pipelined(pipelined: bool) -> Self {
        if pipelined {
            Self::Pipelined
        } else {
            Self::Sequential
        }
    }
}

/// What was committed for one file before it finished or failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub batches: usize,
    pub rows: usize,
}

/// Result of [`BatchExecutor::drive`].
#[derive(Debug)]
pub struct DriveOutcome<R> {
    /// The batch source, handed back so callers can inspect its counters.
    pub reader: R,
    pub progress: Progress,
    /// First reader or store error; batches before it stay committed.
    pub result: IngestionResult<()>,
}

/// Submits batches and standalone statements to a [`GraphStore`].
#[derive(Debug)]
pub struct BatchExecutor<S> {
    store: S,
    metrics: Arc<ExecutionMetrics>,
}

impl<S: GraphStore> BatchExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Execute `query` once for `batch`, with the records bound to [`BATCH_PARAMETER`].
    ///
    /// The batch is consumed; it is dropped as soon as the store has acknowledged it.
    pub fn execute(&mut self, query: &str, batch: Batch) -> IngestionResult<()> {
        let sequence = batch.sequence;
        let rows = batch.len();
        let mut parameters = Parameters::new();
        parameters.insert(
            BATCH_PARAMETER.to_string(),
            Value::Array(batch.rows.into_iter().map(Value::Object).collect()),
        );

        let started = Instant::now();
        let result = self.store.execute(query, &parameters);
        let waited = started.elapsed();
        match result {
            Ok(()) => {
                self.metrics.on_batch_acknowledged(rows, waited);
                trace!(sequence, rows, ?waited, "batch acknowledged");
                Ok(())
            }
            Err(e) => {
                self.metrics.on_store_wait(waited);
                Err(e.into())
            }
        }
    }

    /// Execute a standalone statement without parameters.
    pub fn run_statement(&mut self, statement: &str) -> IngestionResult<()> {
        let started = Instant::now();
        let result = self.store.execute(statement, &Parameters::new());
        let waited = started.elapsed();
        match result {
            Ok(()) => {
                self.metrics.on_statement_acknowledged(waited);
                debug!(statement, ?waited, "statement executed");
                Ok(())
            }
            Err(e) => {
                self.metrics.on_store_wait(waited);
                Err(e.into())
            }
        }
    }

    /// Execute every batch produced by `reader`, in order, until it ends or an error occurs.
    ///
    /// `on_batch(sequence, rows)` is called after each acknowledged batch.
    pub fn drive<R>(
        &mut self,
        query: &str,
        reader: R,
        mode: ExecutionMode,
        mut on_batch: impl FnMut(usize, usize),
    ) -> DriveOutcome<R>
    where
        R: Iterator<Item = IngestionResult<Batch>> + Send,
    {
        match mode {
            ExecutionMode::Sequential => self.drive_sequential(query, reader, &mut on_batch),
            ExecutionMode::Pipelined => self.drive_pipelined(query, reader, &mut on_batch),
        }
    }

    fn drive_sequential<R>(
        &mut self,
        query: &str,
        mut reader: R,
        on_batch: &mut dyn FnMut(usize, usize),
    ) -> DriveOutcome<R>
    where
        R: Iterator<Item = IngestionResult<Batch>>,
    {
        let (progress, result) = self.consume(query, reader.by_ref(), on_batch);
        DriveOutcome {
            reader,
            progress,
            result,
        }
    }

    fn drive_pipelined<R>(
        &mut self,
        query: &str,
        reader: R,
        on_batch: &mut dyn FnMut(usize, usize),
    ) -> DriveOutcome<R>
    where
        R: Iterator<Item = IngestionResult<Batch>> + Send,
    {
        thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<IngestionResult<Batch>>(0);
            let parser = scope.spawn(move || {
                let mut reader = reader;
                for item in reader.by_ref() {
                    let failed = item.is_err();
                    // A closed channel means the executor stopped.
                    if tx.send(item).is_err() || failed {
                        break;
                    }
                }
                reader
            });

            let (progress, result) = self.consume_channel(query, rx, on_batch);
            let reader = match parser.join() {
                Ok(reader) => reader,
                Err(payload) => panic::resume_unwind(payload),
            };
            DriveOutcome {
                reader,
                progress,
                result,
            }
        })
    }

    // Takes the receiver by value so that an early return closes the channel and stops the parser.
    fn consume_channel(
        &mut self,
        query: &str,
        rx: Receiver<IngestionResult<Batch>>,
        on_batch: &mut dyn FnMut(usize, usize),
    ) -> (Progress, IngestionResult<()>) {
        self.consume(query, rx.into_iter(), on_batch)
    }

    fn consume(
        &mut self,
        query: &str,
        batches: impl Iterator<Item = IngestionResult<Batch>>,
        on_batch: &mut dyn FnMut(usize, usize),
    ) -> (Progress, IngestionResult<()>) {
        let mut progress = Progress::default();
        for item in batches {
            let batch = match item {
                Ok(batch) => batch,
                Err(e) => return (progress, Err(e)),
            };
            let (sequence, rows) = (batch.sequence, batch.len());
            if let Err(e) = self.execute(query, batch) {
                return (progress, Err(e));
            }
            progress.batches += 1;
            progress.rows += rows;
            on_batch(sequence, rows);
        }
        (progress, Ok(()))
    }
}
