//! `graph-ingest` bulk-loads CSV and JSON files into a graph database.
//!
//! Files are streamed, never loaded whole: each one is read in bounded batches and every batch is
//! submitted to the store as a single list parameter (`$rows`) of a user-supplied parameterized
//! query. Memory use is bounded by one batch plus parser state.
//!
//! ## Inputs
//!
//! - **Locations**: local paths, `file://`, `http(s)://` (cargo feature `http`, on by default) and
//!   `s3://bucket/key` (cargo feature `s3`)
//! - **Compression**: `gzip`, `zip` (first entry of the archive) or none
//! - **Formats**: CSV with a header row (every value stays text) and JSON arrays of objects
//!   (integers stay integers, other numbers become `f64`)
//!
//! CSV is tolerant: rows with the wrong number of fields are skipped and counted. JSON is strict:
//! any malformed token fails the file.
//!
//! ## Stores
//!
//! `server_uri` picks the adapter: `http(s)://` uses the transactional HTTP endpoint (feature
//! `http`), `bolt://` and `neo4j://` use the Bolt protocol (feature `bolt`).
//!
//! ## Quick example
//!
//! ```no_run
//! use graph_ingest::config::IngestionConfig;
//! use graph_ingest::ingestion::Ingestor;
//! use graph_ingest::store::HttpGraphStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestionConfig::from_yaml_str(r#"
//! server_uri: http://localhost:7474
//! admin_user: neo4j
//! admin_pass: secret
//! pre_ingest:
//!   - CREATE INDEX person_id IF NOT EXISTS FOR (p:Person) ON (p.id)
//! files:
//!   - url: data/people.csv.gz
//!     compression: gzip
//!     chunk_size: 500
//!     query: UNWIND $rows AS row MERGE (p:Person {id: row.id}) SET p.name = row.name
//! "#)?;
//!
//! let store = HttpGraphStore::from_config(&config)?;
//! let report = Ingestor::new(&config, store).run()?;
//! for file in report.failed() {
//!     eprintln!("{} failed: {:?}", file.url, file.error());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: orchestration, transports, decompression and the CSV/JSON batch readers
//! - [`execution`]: batch submission and run metrics
//! - [`store`]: the [`store::GraphStore`] trait and its adapters
//! - [`config`]: YAML run configuration
//! - [`logging`]: tracing subscriber setup for binaries
//! - [`error`]: error types used across ingestion

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod logging;
pub mod store;
pub mod types;

pub use error::{IngestionError, IngestionResult};
