use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::IngestionError;
use crate::types::FileFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (the file failed on its own inputs).
    Error,
    /// Critical error (transport, I/O or store failures).
    Critical,
}

impl IngestionSeverity {
    /// Severity of a file failure caused by `error`.
    pub fn of(error: &IngestionError) -> Self {
        match error {
            IngestionError::Transport { .. } | IngestionError::Io(_) | IngestionError::Store(_) => {
                Self::Critical
            }
            IngestionError::Csv(e) if e.is_io_error() => Self::Critical,
            IngestionError::ConfigLoad { .. }
            | IngestionError::Config { .. }
            | IngestionError::UnsupportedCompression { .. }
            | IngestionError::UnsupportedFormat { .. }
            | IngestionError::Csv(_)
            | IngestionError::Json { .. } => Self::Error,
        }
    }
}

/// The file an event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    /// Position of the file in the configuration.
    pub index: usize,
    /// The url after `basepath` is applied, or the declared one if resolution failed.
    pub url: String,
    /// Known once parameters are resolved.
    pub format: Option<FileFormat>,
}

/// Stats for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Batches acknowledged by the store.
    pub batches: usize,
    /// Rows acknowledged by the store.
    pub rows: usize,
    /// CSV rows skipped for having the wrong shape.
    pub malformed_rows: u64,
    pub elapsed: Duration,
}

/// Observer interface for ingestion progress and outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts. Every method has an empty default.
pub trait IngestionObserver: Send + Sync {
    /// Called before a file's parameters are resolved.
    fn on_file_started(&self, _ctx: &FileContext) {}

    /// Called instead of any other callback when a file is marked `skip_file`.
    fn on_file_skipped(&self, _ctx: &FileContext) {}

    /// Called after each acknowledged batch.
    fn on_batch(&self, _ctx: &FileContext, _sequence: usize, _rows: usize) {}

    /// Called when a file completes.
    fn on_success(&self, _ctx: &FileContext, _stats: FileStats) {}

    /// Called when a file fails.
    fn on_failure(&self, _ctx: &FileContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a file failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &FileContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_file_started(&self, ctx: &FileContext) {
        for o in &self.observers {
            o.on_file_started(ctx);
        }
    }

    fn on_file_skipped(&self, ctx: &FileContext) {
        for o in &self.observers {
            o.on_file_skipped(ctx);
        }
    }

    fn on_batch(&self, ctx: &FileContext, sequence: usize, rows: usize) {
        for o in &self.observers {
            o.on_batch(ctx, sequence, rows);
        }
    }

    fn on_success(&self, ctx: &FileContext, stats: FileStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &FileContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &FileContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Reports ingestion events as `tracing` events. This is the default observer.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_file_started(&self, ctx: &FileContext) {
        info!(index = ctx.index, url = %ctx.url, "ingesting file");
    }

    fn on_file_skipped(&self, ctx: &FileContext) {
        info!(index = ctx.index, url = %ctx.url, "skipping file");
    }

    fn on_batch(&self, ctx: &FileContext, sequence: usize, rows: usize) {
        debug!(index = ctx.index, sequence, rows, "batch committed");
    }

    fn on_success(&self, ctx: &FileContext, stats: FileStats) {
        if stats.malformed_rows > 0 {
            warn!(
                index = ctx.index,
                url = %ctx.url,
                malformed_rows = stats.malformed_rows,
                "skipped malformed csv rows"
            );
        }
        info!(
            index = ctx.index,
            url = %ctx.url,
            format = ?ctx.format,
            batches = stats.batches,
            rows = stats.rows,
            elapsed = ?stats.elapsed,
            "file ingested"
        );
    }

    fn on_failure(&self, ctx: &FileContext, severity: IngestionSeverity, error: &IngestionError) {
        warn!(index = ctx.index, url = %ctx.url, ?severity, %error, "file failed");
    }

    fn on_alert(&self, ctx: &FileContext, severity: IngestionSeverity, error: &IngestionError) {
        error!(index = ctx.index, url = %ctx.url, ?severity, %error, "ALERT: file failed");
    }
}
