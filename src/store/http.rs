//! Transactional HTTP adapter.
//!
//! Each call is one auto-committed transaction: `POST {server_uri}/db/{database}/tx/commit` with
//! body `{"statements":[{"statement":..,"parameters":..}]}`. The server reports statement
//! failures in the `errors` array of a `200` response.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IngestionConfig;

use super::{GraphStore, Parameters, StoreError, StoreProtocol};

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [StatementBody<'a>; 1],
}

#[derive(Serialize)]
struct StatementBody<'a> {
    statement: &'a str,
    parameters: &'a Parameters,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Deserialize)]
struct ServerError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Graph store reached over the transactional HTTP API.
#[derive(Debug, Clone)]
pub struct HttpGraphStore {
    client: Client,
    endpoint: String,
    user: String,
    password: String,
}

impl HttpGraphStore {
    /// Build a store from the connection settings of `config`.
    pub fn from_config(config: &IngestionConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.server_uri,
            &config.database,
            &config.admin_user,
            &config.admin_pass,
        )
    }

    pub fn new(server_uri: &str, database: &str, user: &str, password: &str) -> Result<Self, StoreError> {
        let base = server_uri.trim_end_matches('/');
        if StoreProtocol::of(server_uri)? == StoreProtocol::Bolt {
            return Err(StoreError::Connection(format!(
                "'{server_uri}' is a bolt address; use the http port (e.g. http://localhost:7474) \
                 or build with the 'bolt' feature"
            )));
        }
        // Large batches may legitimately take a long time to commit.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{base}/db/{database}/tx/commit"),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Commit endpoint used for every call.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GraphStore for HttpGraphStore {
    fn execute(&mut self, statement: &str, parameters: &Parameters) -> Result<(), StoreError> {
        let body = CommitRequest {
            statements: [StatementBody {
                statement,
                parameters,
            }],
        };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }

        let response = request
            .send()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(StoreError::Protocol(format!("http {status}: {text}")));
        }

        let parsed: CommitResponse = response
            .json()
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        if let Some(first) = parsed.errors.into_iter().next() {
            return Err(StoreError::Statement {
                code: first.code,
                message: first.message,
            });
        }
        debug!(endpoint = %self.endpoint, "statement committed");
        Ok(())
    }
}
