//! Ingestion orchestrator.
//!
//! [`Ingestor::run`] drives a whole configuration:
//!
//! 1. every `pre_ingest` statement, in order (any failure aborts the run)
//! 2. every declared file, in order, each one isolated from the others
//! 3. every `post_ingest` statement, in order (any failure is returned as an error)
//!
//! Per file the flow is resolve → open → read → execute. A file marked `skip_file` is reported
//! and nothing else happens for it: no resolution, no transport, no store calls. Any failure while
//! a file is processed is recorded in its [`FileOutcome`] together with what was committed before
//! the failure, and the run moves on.
//!
//! When an [`IngestionObserver`] is configured (the default is [`TracingObserver`]), it is told
//! about every file, every acknowledged batch and every failure; failures at or above the alert
//! threshold additionally go to `on_alert`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, info_span};

use crate::config::{FileSpec, IngestionConfig};
use crate::error::{IngestionError, IngestionResult};
use crate::execution::{BatchExecutor, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionMode};
use crate::store::GraphStore;
use crate::types::{Batch, FileFormat};

use super::compression::{open_stream, InputStream};
use super::csv::{csv_batches, CsvBatchReader};
use super::json::{json_batches, JsonBatchReader};
use super::observability::{FileContext, FileStats, IngestionObserver, IngestionSeverity, TracingObserver};
use super::params::{resolve, ResolvedParams};
use super::transport::Transport;

/// Batch reader for either supported format.
#[derive(Debug)]
pub enum BatchReader {
    Csv(CsvBatchReader<InputStream>),
    Json(JsonBatchReader<InputStream>),
}

impl BatchReader {
    /// Start reading `stream` with the format and options of `params`.
    ///
    /// For CSV this reads the header.
    pub fn open(stream: InputStream, params: &ResolvedParams) -> IngestionResult<Self> {
        match params.format {
            FileFormat::Csv => csv_batches(stream, &params.csv_options()).map(Self::Csv),
            FileFormat::Json => json_batches(stream, &params.json_options()).map(Self::Json),
        }
    }

    /// CSV rows skipped so far for having the wrong shape. Always 0 for JSON.
    pub fn malformed_rows(&self) -> u64 {
        match self {
            Self::Csv(reader) => reader.source().malformed_rows(),
            Self::Json(_) => 0,
        }
    }
}

impl Iterator for BatchReader {
    type Item = IngestionResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Csv(reader) => reader.next(),
            Self::Json(reader) => reader.next(),
        }
    }
}

/// Final state of one declared file.
#[derive(Debug)]
pub enum FileStatus {
    /// `skip_file` was set.
    Skipped,
    Completed(FileStats),
    /// `stats` covers the batches committed before the failure.
    Failed { error: IngestionError, stats: FileStats },
}

/// Outcome of one declared file.
#[derive(Debug)]
pub struct FileOutcome {
    /// Position in the configuration.
    pub index: usize,
    pub url: String,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }

    /// Stats for completed and failed files.
    pub fn stats(&self) -> Option<FileStats> {
        match &self.status {
            FileStatus::Skipped => None,
            FileStatus::Completed(stats) | FileStatus::Failed { stats, .. } => Some(*stats),
        }
    }

    pub fn error(&self) -> Option<&IngestionError> {
        match &self.status {
            FileStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Summary of a run.
#[derive(Debug)]
pub struct IngestReport {
    /// One entry per declared file, in declaration order.
    pub files: Vec<FileOutcome>,
    pub metrics: ExecutionMetricsSnapshot,
}

impl IngestReport {
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(FileOutcome::is_failed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.is_failed())
    }

    /// Rows acknowledged across all files.
    pub fn total_rows(&self) -> usize {
        self.files.iter().filter_map(FileOutcome::stats).map(|s| s.rows).sum()
    }
}

/// Runs an [`IngestionConfig`] against a [`GraphStore`].
pub struct Ingestor<'a, S> {
    config: &'a IngestionConfig,
    executor: BatchExecutor<S>,
    transport: Transport,
    observer: Arc<dyn IngestionObserver>,
    alert_at_or_above: IngestionSeverity,
    mode: ExecutionMode,
}

impl<S> fmt::Debug for Ingestor<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("files", &self.config.files.len())
            .field("transport", &self.transport)
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("mode", &self.mode)
            .finish()
    }
}

impl<'a, S: GraphStore> Ingestor<'a, S> {
    /// Ingestor with the default transport, a [`TracingObserver`], alerts on critical failures
    /// and the execution mode selected by `config.pipelined`.
    pub fn new(config: &'a IngestionConfig, store: S) -> Self {
        Self {
            config,
            executor: BatchExecutor::new(store),
            transport: Transport::new(),
            observer: Arc::new(TracingObserver),
            alert_at_or_above: IngestionSeverity::Critical,
            mode: ExecutionMode::from_pipelined(config.pipelined),
        }
    }

    /// Use `transport` to open files (e.g. one with an object-store client).
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Severity at or above which `on_alert` is invoked.
    pub fn with_alert_threshold(mut self, severity: IngestionSeverity) -> Self {
        self.alert_at_or_above = severity;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        self.executor.metrics()
    }

    pub fn store(&self) -> &S {
        self.executor.store()
    }

    pub fn into_store(self) -> S {
        self.executor.into_store()
    }

    /// Run pre-ingest statements, every file, then post-ingest statements.
    ///
    /// Returns `Err` only when a pre- or post-ingest statement fails; per-file failures are
    /// reported in the [`IngestReport`].
    pub fn run(&mut self) -> IngestionResult<IngestReport> {
        let config = self.config;
        let metrics = self.executor.metrics();
        metrics.begin_run();
        info!(
            files = config.files.len(),
            pre_ingest = config.pre_ingest.len(),
            post_ingest = config.post_ingest.len(),
            mode = ?self.mode,
            "starting ingestion"
        );

        self.run_statements("pre_ingest", &config.pre_ingest)?;

        let files = config
            .files
            .iter()
            .enumerate()
            .map(|(index, spec)| self.ingest_file(index, spec))
            .collect::<Vec<_>>();

        self.run_statements("post_ingest", &config.post_ingest)?;

        metrics.end_run();
        let report = IngestReport {
            files,
            metrics: metrics.snapshot(),
        };
        info!(
            failed = report.failed().count(),
            metrics = %report.metrics,
            "ingestion finished"
        );
        Ok(report)
    }

    fn run_statements(&mut self, phase: &str, statements: &[String]) -> IngestionResult<()> {
        for (i, statement) in statements.iter().enumerate() {
            if let Err(e) = self.executor.run_statement(statement) {
                error!(phase, index = i, %e, "statement failed, aborting run");
                return Err(e);
            }
        }
        Ok(())
    }

    fn ingest_file(&mut self, index: usize, spec: &FileSpec) -> FileOutcome {
        let span = info_span!("file", index, url = %spec.display_url());
        let _entered = span.enter();

        let mut ctx = FileContext {
            index,
            url: spec.display_url().to_string(),
            format: None,
        };

        if spec.skip_file {
            self.observer.on_file_skipped(&ctx);
            return FileOutcome {
                index,
                url: ctx.url,
                status: FileStatus::Skipped,
            };
        }

        self.observer.on_file_started(&ctx);
        let started = Instant::now();

        let params = match resolve(spec, self.config) {
            Ok(params) => params,
            Err(e) => return self.fail(ctx, e, FileStats::default()),
        };
        ctx.url.clone_from(&params.url);
        ctx.format = Some(params.format);

        let reader = match open_stream(&self.transport, &params)
            .and_then(|stream| BatchReader::open(stream, &params))
        {
            Ok(reader) => reader,
            Err(e) => {
                let stats = FileStats {
                    elapsed: started.elapsed(),
                    ..FileStats::default()
                };
                return self.fail(ctx, e, stats);
            }
        };

        let observer = Arc::clone(&self.observer);
        let outcome = self
            .executor
            .drive(&params.query, reader, self.mode, |sequence, rows| {
                observer.on_batch(&ctx, sequence, rows)
            });

        let stats = FileStats {
            batches: outcome.progress.batches,
            rows: outcome.progress.rows,
            malformed_rows: outcome.reader.malformed_rows(),
            elapsed: started.elapsed(),
        };
        match outcome.result {
            Ok(()) => {
                self.observer.on_success(&ctx, stats);
                FileOutcome {
                    index,
                    url: ctx.url,
                    status: FileStatus::Completed(stats),
                }
            }
            Err(e) => self.fail(ctx, e, stats),
        }
    }

    fn fail(&self, ctx: FileContext, error: IngestionError, stats: FileStats) -> FileOutcome {
        let severity = IngestionSeverity::of(&error);
        self.observer.on_failure(&ctx, severity, &error);
        if severity >= self.alert_at_or_above {
            self.observer.on_alert(&ctx, severity, &error);
        }
        FileOutcome {
            index: ctx.index,
            url: ctx.url,
            status: FileStatus::Failed { error, stats },
        }
    }
}

/// Ingest everything declared in `config` into `store` with default settings.
///
/// ```no_run
/// use graph_ingest::config::IngestionConfig;
/// use graph_ingest::ingestion::ingest;
/// use graph_ingest::store::DryRunStore;
///
/// # fn main() -> Result<(), graph_ingest::IngestionError> {
/// let config = IngestionConfig::from_path("ingest.yml")?;
/// let report = ingest(&config, DryRunStore)?;
/// println!("rows={} failed={}", report.total_rows(), report.has_failures());
/// # Ok(())
/// # }
/// ```
pub fn ingest<S: GraphStore>(config: &IngestionConfig, store: S) -> IngestionResult<IngestReport> {
    Ingestor::new(config, store).run()
}
