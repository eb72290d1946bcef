//! Run configuration.
//!
//! An [`IngestionConfig`] is loaded once (usually from YAML) and then only borrowed. Per-file
//! options stay loosely typed here; [`crate::ingestion::params::resolve`] turns each
//! [`FileSpec`] into validated parameters, so one bad entry fails only its own file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{IngestionError, IngestionResult};

fn default_database() -> String {
    "neo4j".to_string()
}

/// Process-wide ingestion settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestionConfig {
    /// Address of the backing store.
    pub server_uri: String,
    /// Store user name.
    #[serde(default)]
    pub admin_user: String,
    /// Store password.
    #[serde(default)]
    pub admin_pass: String,
    /// Target database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Prefix prepended to every file `url`.
    #[serde(default)]
    pub basepath: Option<String>,
    /// Files to ingest, in order.
    #[serde(default)]
    pub files: Vec<FileSpec>,
    /// Statements run once before the first file.
    #[serde(default)]
    pub pre_ingest: Vec<String>,
    /// Statements run once after the last file.
    #[serde(default)]
    pub post_ingest: Vec<String>,
    /// Parse the next batch while the previous one executes.
    #[serde(default)]
    pub pipelined: bool,
}

/// One declared input file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawFileSpec")]
pub struct FileSpec {
    pub url: Option<String>,
    pub file_type: Option<String>,
    pub compression: Option<String>,
    pub skip_records: Option<u64>,
    pub chunk_size: Option<usize>,
    pub field_separator: Option<String>,
    pub query: Option<String>,
    pub skip_file: bool,
    /// Options that were present but could not be interpreted. Reported when the file is
    /// resolved, so the rest of the run is unaffected.
    pub invalid_options: Vec<String>,
}

/// A file entry as written in YAML, before its numeric and boolean options are checked.
#[derive(Deserialize)]
struct RawFileSpec {
    url: Option<String>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    compression: Option<String>,
    #[serde(default)]
    skip_records: serde_yaml::Value,
    #[serde(default)]
    chunk_size: serde_yaml::Value,
    field_separator: Option<String>,
    #[serde(alias = "cql")]
    query: Option<String>,
    #[serde(default)]
    skip_file: serde_yaml::Value,
}

impl From<RawFileSpec> for FileSpec {
    fn from(raw: RawFileSpec) -> Self {
        let mut invalid_options = Vec::new();
        let mut count = |name: &str, value: &serde_yaml::Value| match value {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::Number(n) if n.as_u64().is_some() => n.as_u64(),
            other => {
                invalid_options.push(format!("{name} must be a non-negative integer, got {}", describe(other)));
                None
            }
        };
        let skip_records = count("skip_records", &raw.skip_records);
        let chunk_size = count("chunk_size", &raw.chunk_size).and_then(|n| usize::try_from(n).ok());
        let skip_file = match &raw.skip_file {
            serde_yaml::Value::Null => false,
            serde_yaml::Value::Bool(b) => *b,
            other => {
                invalid_options.push(format!("skip_file must be true or false, got {}", describe(other)));
                false
            }
        };

        Self {
            url: raw.url,
            file_type: raw.file_type,
            compression: raw.compression,
            skip_records,
            chunk_size,
            field_separator: raw.field_separator,
            query: raw.query,
            skip_file,
            invalid_options,
        }
    }
}

fn describe(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}

impl FileSpec {
    /// A file entry with only the required fields set.
    pub fn new(url: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// The declared url, or a placeholder for reporting when it is missing.
    pub fn display_url(&self) -> &str {
        self.url.as_deref().unwrap_or("<missing url>")
    }
}

impl IngestionConfig {
    /// A configuration with no files or statements.
    pub fn new(server_uri: impl Into<String>) -> Self {
        Self {
            server_uri: server_uri.into(),
            admin_user: String::new(),
            admin_pass: String::new(),
            database: default_database(),
            basepath: None,
            files: Vec::new(),
            pre_ingest: Vec::new(),
            post_ingest: Vec::new(),
            pipelined: false,
        }
    }

    /// Parse a YAML configuration document.
    pub fn from_yaml_str(input: &str) -> IngestionResult<Self> {
        serde_yaml::from_str(input).map_err(|e| IngestionError::ConfigLoad {
            message: e.to_string(),
        })
    }

    /// Read and parse a YAML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| IngestionError::ConfigLoad {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::IngestionConfig;

    #[test]
    fn parses_full_document() {
        let yaml = r#"
server_uri: http://localhost:7474
admin_user: neo4j
admin_pass: secret
basepath: /data/
pre_ingest:
  - CREATE INDEX IF NOT EXISTS FOR (p:Person) ON (p.id)
files:
  - url: people.csv.gz
    compression: gzip
    chunk_size: 500
    skip_records: 2
    field_separator: "|"
    cql: |
      UNWIND $rows AS row MERGE (p:Person {id: row.id})
  - url: orgs.json
    type: json
    query: UNWIND $rows AS row MERGE (o:Org {id: row.id})
    skip_file: true
post_ingest:
  - MATCH (n) RETURN count(n)
"#;
        let cfg = IngestionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.database, "neo4j");
        assert_eq!(cfg.basepath.as_deref(), Some("/data/"));
        assert_eq!(cfg.files.len(), 2);
        assert_eq!(cfg.files[0].chunk_size, Some(500));
        assert_eq!(cfg.files[0].field_separator.as_deref(), Some("|"));
        assert!(cfg.files[0].query.as_deref().unwrap().contains("UNWIND $rows"));
        assert_eq!(cfg.files[1].file_type.as_deref(), Some("json"));
        assert!(cfg.files[1].skip_file);
        assert_eq!(cfg.pre_ingest.len(), 1);
        assert_eq!(cfg.post_ingest.len(), 1);
        assert!(!cfg.pipelined);
    }

    #[test]
    fn missing_url_still_loads() {
        let yaml = "server_uri: x\nfiles:\n  - query: RETURN 1\n";
        let cfg = IngestionConfig::from_yaml_str(yaml).unwrap();
        assert!(cfg.files[0].url.is_none());
        assert_eq!(cfg.files[0].display_url(), "<missing url>");
    }

    #[test]
    fn malformed_yaml_is_a_load_error() {
        let err = IngestionConfig::from_yaml_str("files: [").unwrap_err();
        assert!(err.to_string().contains("failed to load configuration"));
    }

    #[test]
    fn wrongly_typed_file_options_are_kept_for_resolution() {
        let yaml = r#"
server_uri: http://localhost:7474
files:
  - url: a.csv
    query: RETURN 1
    chunk_size: -5
    skip_records: x
    skip_file: maybe
  - url: b.csv
    query: RETURN 1
    chunk_size: 10
"#;
        let cfg = IngestionConfig::from_yaml_str(yaml).unwrap();
        let bad = &cfg.files[0];
        assert_eq!(bad.chunk_size, None);
        assert_eq!(bad.skip_records, None);
        assert!(!bad.skip_file);
        assert_eq!(bad.invalid_options.len(), 3);
        assert!(bad
            .invalid_options
            .iter()
            .any(|m| m.contains("chunk_size") && m.contains("-5")));
        assert!(cfg.files[1].invalid_options.is_empty());
        assert_eq!(cfg.files[1].chunk_size, Some(10));
    }
}
