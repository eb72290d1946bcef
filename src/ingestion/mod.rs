//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`Ingestor`] (or the [`ingest`] shortcut) from [`unified`], which:
//!
//! - resolves each declared file into validated parameters ([`params`])
//! - opens it through the right transport ([`transport`]) and decompressor ([`compression`])
//! - streams it in batches with the CSV or JSON reader ([`csv`], [`json`])
//! - hands every batch to the [`crate::execution::BatchExecutor`]
//! - reports progress and failures to an [`IngestionObserver`]
//!
//! The readers are usable on their own, e.g. [`csv::csv_batches_from_path`].

pub mod batch;
pub mod compression;
pub mod csv;
pub mod json;
pub mod observability;
pub mod params;
#[cfg(feature = "s3")]
pub mod s3;
pub mod transport;
pub mod unified;

pub use compression::{open_stream, InputStream};
pub use observability::{
    CompositeObserver, FileContext, FileStats, IngestionObserver, IngestionSeverity, TracingObserver,
};
pub use params::{needs_object_store, resolve, ResolvedParams};
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
pub use transport::{ObjectStore, RawStream, Source, Transport};
pub use unified::{ingest, BatchReader, FileOutcome, FileStatus, IngestReport, Ingestor};
