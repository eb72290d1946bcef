//! `graph-ingest` command line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use graph_ingest::config::IngestionConfig;
use graph_ingest::ingestion::{IngestReport, Ingestor, Transport};
use graph_ingest::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use graph_ingest::store::{DryRunStore, GraphStore, StoreProtocol};
use tracing::error;

/// Stream CSV and JSON files into a graph database.
#[derive(Debug, Parser)]
#[command(name = "graph-ingest", version, about)]
struct Cli {
    /// YAML configuration file.
    config: PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Log line format.
    #[arg(long, value_name = "text|json", env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log statements and batch sizes instead of sending them to the database.
    #[arg(long)]
    dry_run: bool,

    /// Parse the next batch while the previous one executes (overrides the config file).
    #[arg(long)]
    pipelined: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    if let Err(e) = init_logging(&log_config) {
        eprintln!("warning: logging disabled: {e:#}");
    }

    match run(&cli) {
        Ok(report) if !report.has_failures() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{e:#}"), "ingestion aborted");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<IngestReport> {
    let mut config = IngestionConfig::from_path(&cli.config)?;
    if cli.pipelined {
        config.pipelined = true;
    }

    let transport = transport_for(&config)?;
    if cli.dry_run {
        return ingest(&config, transport, DryRunStore);
    }
    ingest(&config, transport, connect(&config)?)
}

fn ingest<S: GraphStore>(config: &IngestionConfig, transport: Transport, store: S) -> Result<IngestReport> {
    let report = Ingestor::new(config, store).with_transport(transport).run()?;
    Ok(report)
}

fn connect(config: &IngestionConfig) -> Result<Box<dyn GraphStore>> {
    let store = match StoreProtocol::of(&config.server_uri)? {
        StoreProtocol::Http => http_store(config)?,
        StoreProtocol::Bolt => bolt_store(config)?,
    };
    Ok(store)
}

#[cfg(feature = "http")]
fn http_store(config: &IngestionConfig) -> Result<Box<dyn GraphStore>> {
    let store = graph_ingest::store::HttpGraphStore::from_config(config)
        .with_context(|| format!("cannot connect to {}", config.server_uri))?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "http"))]
fn http_store(_config: &IngestionConfig) -> Result<Box<dyn GraphStore>> {
    anyhow::bail!("http store is not compiled in (enable cargo feature 'http') or use --dry-run")
}

#[cfg(feature = "bolt")]
fn bolt_store(config: &IngestionConfig) -> Result<Box<dyn GraphStore>> {
    let store = graph_ingest::store::BoltGraphStore::from_config(config)
        .with_context(|| format!("cannot connect to {}", config.server_uri))?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "bolt"))]
fn bolt_store(config: &IngestionConfig) -> Result<Box<dyn GraphStore>> {
    anyhow::bail!(
        "'{}' is a bolt address but bolt support is not compiled in; enable cargo feature 'bolt' \
         or point server_uri at the http port (e.g. http://localhost:7474)",
        config.server_uri
    )
}

#[cfg(feature = "s3")]
fn transport_for(config: &IngestionConfig) -> Result<Transport> {
    use std::sync::Arc;

    use graph_ingest::ingestion::{needs_object_store, S3ObjectStore};

    if !needs_object_store(config) {
        return Ok(Transport::new());
    }
    let store = S3ObjectStore::from_env().context("failed to initialize the S3 client")?;
    Ok(Transport::new().with_object_store(Arc::new(store)))
}

#[cfg(not(feature = "s3"))]
fn transport_for(_config: &IngestionConfig) -> Result<Transport> {
    Ok(Transport::new())
}
