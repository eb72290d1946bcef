use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Real-time counters for an ingestion run.
///
/// The executor updates these as batches are acknowledged; callers can snapshot them at any time,
/// from any thread.
#[derive(Debug)]
pub struct ExecutionMetrics {
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    batches_executed: AtomicU64,
    rows_executed: AtomicU64,
    statements_executed: AtomicU64,
    store_wait_ns: AtomicU64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            batches_executed: AtomicU64::new(0),
            rows_executed: AtomicU64::new(0),
            statements_executed: AtomicU64::new(0),
            store_wait_ns: AtomicU64::new(0),
        }
    }

    /// Reset every counter and start the run clock.
    pub fn begin_run(&self) {
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Instant::now());
        }
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.batches_executed.store(0, Ordering::SeqCst);
        self.rows_executed.store(0, Ordering::SeqCst);
        self.statements_executed.store(0, Ordering::SeqCst);
        self.store_wait_ns.store(0, Ordering::SeqCst);
    }

    /// Stop the run clock.
    pub fn end_run(&self) {
        let started = self.started_at.lock().ok().and_then(|s| *s);
        if let Some(started) = started {
            self.elapsed_ns.store(as_nanos(started.elapsed()), Ordering::SeqCst);
        }
    }

    pub(crate) fn on_batch_acknowledged(&self, rows: usize, waited: Duration) {
        let _ = self.batches_executed.fetch_add(1, Ordering::SeqCst);
        let _ = self.rows_executed.fetch_add(rows as u64, Ordering::SeqCst);
        self.on_store_wait(waited);
    }

    pub(crate) fn on_statement_acknowledged(&self, waited: Duration) {
        let _ = self.statements_executed.fetch_add(1, Ordering::SeqCst);
        self.on_store_wait(waited);
    }

    // Failed calls count towards the wait too: the time was spent either way.
    pub(crate) fn on_store_wait(&self, waited: Duration) {
        let _ = self.store_wait_ns.fetch_add(as_nanos(waited), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            elapsed,
            batches_executed: self.batches_executed.load(Ordering::SeqCst),
            rows_executed: self.rows_executed.load(Ordering::SeqCst),
            statements_executed: self.statements_executed.load(Ordering::SeqCst),
            store_wait: Duration::from_nanos(self.store_wait_ns.load(Ordering::SeqCst)),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn as_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    /// Set once the run has ended.
    pub elapsed: Option<Duration>,
    pub batches_executed: u64,
    pub rows_executed: u64,
    /// Pre/post ingest statements.
    pub statements_executed: u64,
    pub store_wait: Duration,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batches={}, rows={}, statements={}, store_wait={:?}, elapsed={:?}",
            self.batches_executed, self.rows_executed, self.statements_executed, self.store_wait, self.elapsed
        )
    }
}
