//! Bolt protocol adapter (cargo feature `bolt`).
//!
//! Accepts the `bolt://` and `neo4j://` addresses (with `+s`/`+ssc` variants) that driver-based
//! configurations use. The driver is async; calls block on a private runtime, the same way the
//! S3 object store does.

use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph};
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::config::IngestionConfig;

use super::{GraphStore, Parameters, StoreError};

/// Graph store reached over Bolt.
pub struct BoltGraphStore {
    runtime: Runtime,
    graph: Graph,
}

impl BoltGraphStore {
    /// Connect with the settings of `config`.
    pub fn from_config(config: &IngestionConfig) -> Result<Self, StoreError> {
        Self::connect(
            &config.server_uri,
            &config.database,
            &config.admin_user,
            &config.admin_pass,
        )
    }

    pub fn connect(server_uri: &str, database: &str, user: &str, password: &str) -> Result<Self, StoreError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let driver_config = ConfigBuilder::default()
            .uri(server_uri)
            .user(user)
            .password(password)
            .db(database)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let graph = runtime
            .block_on(Graph::connect(driver_config))
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        debug!(server_uri, database, "bolt connection pool ready");
        Ok(Self { runtime, graph })
    }
}

impl GraphStore for BoltGraphStore {
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError> {
        let q = parameters
            .iter()
            .fold(query(statement), |q, (name, value)| q.param(name, to_bolt(value)));
        self.runtime.block_on(self.graph.run(q)).map_err(|e| match e {
            neo4rs::Error::Neo4j(server) => StoreError::Statement {
                code: server.code().to_string(),
                message: server.message().to_string(),
            },
            other => StoreError::Connection(other.to_string()),
        })
    }
}

/// Convert a record value into a driver parameter.
pub fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BoltType::from(s.clone()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(BoltString::from(key.as_str()), to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}
