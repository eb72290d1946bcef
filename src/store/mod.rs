//! Backing graph store abstraction.
//!
//! The engine only needs one operation: run a statement with named parameters and block until
//! the store acknowledges it. Adapters:
//!
//! - [`http::HttpGraphStore`]: transactional HTTP endpoint (cargo feature `http`)
//! - [`bolt::BoltGraphStore`]: Bolt protocol, for `bolt://` and `neo4j://` addresses (cargo feature `bolt`)
//! - [`memory::RecordingStore`]: in-memory, records calls and can inject failures
//! - [`DryRunStore`]: logs what would be executed

#[cfg(feature = "bolt")]
pub mod bolt;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;

use thiserror::Error;
use tracing::info;

#[cfg(feature = "bolt")]
pub use bolt::BoltGraphStore;
#[cfg(feature = "http")]
pub use http::HttpGraphStore;
pub use memory::{RecordingStore, StoreCall};

/// Named statement parameters.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Failure reported by a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store rejected the statement.
    #[error("statement failed [{code}]: {message}")]
    Statement { code: String, message: String },

    /// The store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The store answered with something that could not be understood.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Wire protocol implied by a `server_uri` scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreProtocol {
    /// `http://`, `https://`
    Http,
    /// `bolt://`, `neo4j://` and their `+s`/`+ssc` variants
    Bolt,
}

impl StoreProtocol {
    /// Classify `server_uri` by scheme (case-insensitive).
    pub fn of(server_uri: &str) -> Result<Self, StoreError> {
        let scheme = server_uri
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        match scheme.as_str() {
            "http" | "https" => Ok(Self::Http),
            "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => Ok(Self::Bolt),
            _ => Err(StoreError::Connection(format!(
                "server_uri must use http(s), bolt or neo4j, got '{server_uri}'"
            ))),
        }
    }
}

/// A store that executes parameterized statements synchronously.
pub trait GraphStore {
    /// Execute `statement` with `parameters`, returning once the store has acknowledged it.
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError>;
}

impl<S: GraphStore + ?Sized> GraphStore for Box<S> {
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError> {
        (**self).execute(statement, parameters)
    }
}

impl<S: GraphStore + ?Sized> GraphStore for &mut S {
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError> {
        (**self).execute(statement, parameters)
    }
}

/// Accepts every statement and logs it instead of executing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunStore;

impl GraphStore for DryRunStore {
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError> {
        let rows = parameters
            .values()
            .find_map(|v| v.as_array().map(Vec::len))
            .unwrap_or(0);
        info!(statement, rows, "dry run: statement not executed");
        Ok(())
    }
}
