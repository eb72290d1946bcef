//! Per-file parameter resolution.
//!
//! [`resolve`] merges a [`FileSpec`] with the run configuration and documented defaults. It does
//! no I/O, so every configuration problem is reported before a file is opened.

use crate::config::{FileSpec, IngestionConfig};
use crate::error::{IngestionError, IngestionResult};
use crate::types::{Compression, FileFormat};

use super::csv::CsvOptions;
use super::json::JsonOptions;
use super::transport::Source;

/// Rows per batch when `chunk_size` is not set.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// CSV separator when `field_separator` is not set.
pub const DEFAULT_FIELD_SEPARATOR: u8 = b',';

/// Fully resolved, validated parameters for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    /// The url with `basepath` applied.
    pub url: String,
    pub source: Source,
    pub format: FileFormat,
    pub compression: Compression,
    pub skip_records: u64,
    /// Always at least 1.
    pub chunk_size: usize,
    pub field_separator: u8,
    pub query: String,
}

impl ResolvedParams {
    /// Options for the CSV reader.
    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            chunk_size: self.chunk_size,
            skip_records: self.skip_records,
            delimiter: self.field_separator,
        }
    }

    /// Options for the JSON reader.
    pub fn json_options(&self) -> JsonOptions {
        JsonOptions {
            chunk_size: self.chunk_size,
            skip_records: self.skip_records,
        }
    }
}

/// Resolve the parameters of one declared file.
///
/// Type selection: declared `type`, then filename suffix (`.json` before `.csv`), then CSV.
pub fn resolve(file: &FileSpec, config: &IngestionConfig) -> IngestionResult<ResolvedParams> {
    let url = full_url(file, config).ok_or_else(|| IngestionError::config("file entry has no 'url'"))?;
    if !file.invalid_options.is_empty() {
        return Err(IngestionError::config(format!(
            "file '{url}': {}",
            file.invalid_options.join("; ")
        )));
    }

    let query = non_empty(file.query.as_deref())
        .ok_or_else(|| IngestionError::config(format!("file '{url}' has no 'query'")))?
        .to_string();

    let compression = match non_empty(file.compression.as_deref()) {
        None => Compression::None,
        Some(name) => Compression::from_name(name).ok_or_else(|| IngestionError::UnsupportedCompression {
            value: name.to_string(),
        })?,
    };

    let chunk_size = match file.chunk_size {
        None => DEFAULT_CHUNK_SIZE,
        Some(0) => return Err(IngestionError::config(format!("file '{url}' has chunk_size 0"))),
        Some(n) => n,
    };

    let field_separator = match non_empty(file.field_separator.as_deref()) {
        None => DEFAULT_FIELD_SEPARATOR,
        Some(sep) => parse_separator(sep)?,
    };

    let source = Source::parse(&url)?;

    let format = match non_empty(file.file_type.as_deref()) {
        Some(name) => FileFormat::from_name(name).ok_or_else(|| IngestionError::UnsupportedFormat {
            value: name.to_string(),
        })?,
        None => FileFormat::sniff(&source.file_name()).unwrap_or(FileFormat::Csv),
    };

    Ok(ResolvedParams {
        url,
        source,
        format,
        compression,
        skip_records: file.skip_records.unwrap_or(0),
        chunk_size,
        field_separator,
        query,
    })
}

/// The declared url with `basepath` prepended, if the file has a url.
pub fn full_url(file: &FileSpec, config: &IngestionConfig) -> Option<String> {
    let declared = non_empty(file.url.as_deref())?;
    Some(match config.basepath.as_deref() {
        Some(base) => format!("{base}{declared}"),
        None => declared.to_string(),
    })
}

/// Whether any file that will be read lives in an object store.
pub fn needs_object_store(config: &IngestionConfig) -> bool {
    config
        .files
        .iter()
        .filter(|file| !file.skip_file)
        .filter_map(|file| full_url(file, config))
        .any(|url| matches!(Source::parse(&url), Ok(Source::ObjectStore { .. })))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_separator(sep: &str) -> IngestionResult<u8> {
    match sep.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(IngestionError::config(format!(
            "field_separator must be a single ASCII character, got {sep:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{needs_object_store, resolve, DEFAULT_CHUNK_SIZE};
    use crate::config::{FileSpec, IngestionConfig};
    use crate::error::IngestionError;
    use crate::ingestion::transport::Source;
    use crate::types::{Compression, FileFormat};

    fn config() -> IngestionConfig {
        IngestionConfig::new("http://localhost:7474")
    }

    #[test]
    fn applies_defaults() {
        let p = resolve(&FileSpec::new("people.csv", "RETURN 1"), &config()).unwrap();
        assert_eq!(p.url, "people.csv");
        assert_eq!(p.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(p.skip_records, 0);
        assert_eq!(p.compression, Compression::None);
        assert_eq!(p.field_separator, b',');
        assert_eq!(p.format, FileFormat::Csv);
        assert_eq!(p.query, "RETURN 1");
    }

    #[test]
    fn prefixes_basepath() {
        let mut cfg = config();
        cfg.basepath = Some("s3://bucket/exports/".to_string());
        let p = resolve(&FileSpec::new("2024/orgs.json.gz", "RETURN 1"), &cfg).unwrap();
        assert_eq!(p.url, "s3://bucket/exports/2024/orgs.json.gz");
        assert_eq!(
            p.source,
            Source::ObjectStore {
                bucket: "bucket".to_string(),
                key: "exports/2024/orgs.json.gz".to_string(),
            }
        );
        assert_eq!(p.format, FileFormat::Json);
    }

    #[test]
    fn declared_type_beats_extension() {
        let mut spec = FileSpec::new("data.json", "RETURN 1");
        spec.file_type = Some("csv".to_string());
        assert_eq!(resolve(&spec, &config()).unwrap().format, FileFormat::Csv);
    }

    #[test]
    fn unknown_extension_defaults_to_csv() {
        let p = resolve(&FileSpec::new("https://host/export?id=7", "RETURN 1"), &config()).unwrap();
        assert_eq!(p.format, FileFormat::Csv);
    }

    #[test]
    fn missing_url_or_query_is_a_config_error() {
        let no_url = FileSpec {
            query: Some("RETURN 1".to_string()),
            ..FileSpec::default()
        };
        assert!(matches!(resolve(&no_url, &config()), Err(IngestionError::Config { .. })));

        let no_query = FileSpec {
            url: Some("a.csv".to_string()),
            ..FileSpec::default()
        };
        let err = resolve(&no_query, &config()).unwrap_err();
        assert!(err.to_string().contains("has no 'query'"));
    }

    #[test]
    fn unsupported_compression_is_rejected() {
        let mut spec = FileSpec::new("a.csv.bz2", "RETURN 1");
        spec.compression = Some("bz2".to_string());
        let err = resolve(&spec, &config()).unwrap_err();
        assert!(matches!(err, IngestionError::UnsupportedCompression { ref value } if value == "bz2"));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let mut spec = FileSpec::new("a.xml", "RETURN 1");
        spec.file_type = Some("xml".to_string());
        assert!(matches!(
            resolve(&spec, &config()),
            Err(IngestionError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn validates_chunk_size_and_separator() {
        let mut spec = FileSpec::new("a.csv", "RETURN 1");
        spec.chunk_size = Some(0);
        assert!(resolve(&spec, &config()).is_err());

        let mut spec = FileSpec::new("a.csv", "RETURN 1");
        spec.field_separator = Some("||".to_string());
        assert!(resolve(&spec, &config()).is_err());

        spec.field_separator = Some("\t".to_string());
        assert_eq!(resolve(&spec, &config()).unwrap().field_separator, b'\t');
    }

    #[test]
    fn invalid_options_fail_only_this_file() {
        let yaml = "server_uri: x\nfiles:\n  - url: a.csv\n    query: RETURN 1\n    chunk_size: -5\n";
        let cfg = IngestionConfig::from_yaml_str(yaml).unwrap();
        let err = resolve(&cfg.files[0], &cfg).unwrap_err();
        assert!(matches!(err, IngestionError::Config { .. }));
        assert!(err.to_string().contains("chunk_size must be a non-negative integer, got -5"), "{err}");
    }

    #[test]
    fn object_store_detection_ignores_scheme_case_and_skipped_files() {
        let mut cfg = config();
        cfg.files = vec![FileSpec::new("people.csv", "RETURN 1")];
        assert!(!needs_object_store(&cfg));

        cfg.basepath = Some("S3://Bucket/exports/".to_string());
        assert!(needs_object_store(&cfg));

        cfg.files[0].skip_file = true;
        assert!(!needs_object_store(&cfg));
    }
}
