//! Transport resolution: turning a file url into a raw byte stream.
//!
//! A url is classified once into a [`Source`]; [`Transport::open`] then produces a
//! [`RawStream`] for it. Decompression is layered on top in [`super::compression`].

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::{IngestionError, IngestionResult};

/// Where the bytes of a file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `s3://bucket/key`
    ObjectStore { bucket: String, key: String },
    /// `file://` url, already converted to a path.
    LocalFile(PathBuf),
    /// Anything else: a bare local path or a remote url handled by the generic opener.
    Generic(String),
}

impl Source {
    /// Classify a url by scheme.
    pub fn parse(url: &str) -> IngestionResult<Self> {
        if let Some(rest) = strip_scheme(url, "s3") {
            let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() || key.is_empty() {
                return Err(IngestionError::config(format!(
                    "object store url must look like s3://bucket/key, got '{url}'"
                )));
            }
            return Ok(Self::ObjectStore {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if strip_scheme(url, "file").is_some() {
            let path = Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| IngestionError::config(format!("invalid file url '{url}'")))?;
            return Ok(Self::LocalFile(path));
        }

        Ok(Self::Generic(url.to_string()))
    }

    /// Final path segment, used for format sniffing.
    pub fn file_name(&self) -> String {
        match self {
            Self::ObjectStore { key, .. } => last_segment(key).to_string(),
            Self::LocalFile(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Generic(location) => {
                let end = location.find(['?', '#']).unwrap_or(location.len());
                last_segment(&location[..end]).to_string()
            }
        }
    }
}

fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = url.split_once("://")?;
    head.eq_ignore_ascii_case(scheme).then_some(rest)
}

fn last_segment(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Client capable of streaming objects out of an object store.
pub trait ObjectStore: Send + Sync {
    /// Fetch the body of `bucket`/`key` as a stream.
    fn get_object(&self, bucket: &str, key: &str) -> IngestionResult<Box<dyn Read + Send>>;
}

/// A readable source that can also seek.
pub trait SeekRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> SeekRead for T {}

/// Raw (still possibly compressed) bytes of one file.
pub enum RawStream {
    /// Object body streamed from an [`ObjectStore`].
    ObjectStore(Box<dyn Read + Send>),
    /// A local file, opened in place.
    LocalFile(File),
    /// Body of a remote fetch made by the generic opener.
    Generic(Box<dyn Read + Send>),
}

impl RawStream {
    /// Make the stream seekable, buffering it fully in memory unless it is a local file.
    pub fn into_seekable(self) -> io::Result<Box<dyn SeekRead>> {
        match self {
            Self::LocalFile(file) => Ok(Box::new(file)),
            Self::ObjectStore(mut reader) | Self::Generic(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                debug!(bytes = buf.len(), "buffered non-seekable stream");
                Ok(Box::new(Cursor::new(buf)))
            }
        }
    }
}

impl Read for RawStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::ObjectStore(r) | Self::Generic(r) => r.read(buf),
            Self::LocalFile(f) => f.read(buf),
        }
    }
}

impl fmt::Debug for RawStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectStore(_) => f.write_str("RawStream::ObjectStore"),
            Self::LocalFile(file) => f.debug_tuple("RawStream::LocalFile").field(file).finish(),
            Self::Generic(_) => f.write_str("RawStream::Generic"),
        }
    }
}

/// Opens raw streams for resolved sources.
#[derive(Clone, Default)]
pub struct Transport {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("object_store_set", &self.object_store.is_some())
            .finish()
    }
}

impl Transport {
    /// A transport without an object-store client (`s3://` urls will fail to open).
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the client used for `s3://` urls.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Open the raw stream for `source`. `url` is only used in error messages.
    pub fn open(&self, url: &str, source: &Source) -> IngestionResult<RawStream> {
        match source {
            Source::ObjectStore { bucket, key } => {
                let store = self.object_store.as_ref().ok_or_else(|| {
                    IngestionError::transport(url, "no object store client is configured")
                })?;
                store.get_object(bucket, key).map(RawStream::ObjectStore)
            }
            Source::LocalFile(path) => File::open(path)
                .map(RawStream::LocalFile)
                .map_err(|e| IngestionError::transport(url, e)),
            Source::Generic(location) => open_generic(location),
        }
    }
}

fn open_generic(location: &str) -> IngestionResult<RawStream> {
    match Url::parse(location) {
        // A one-letter scheme is a Windows drive (`C:\data\x.csv`), not a url.
        Ok(parsed) if parsed.scheme().len() > 1 => match parsed.scheme() {
            "http" | "https" => open_http(location),
            other => Err(IngestionError::transport(
                location,
                format!("unsupported url scheme '{other}'"),
            )),
        },
        _ => File::open(location)
            .map(RawStream::LocalFile)
            .map_err(|e| IngestionError::transport(location, e)),
    }
}

#[cfg(feature = "http")]
fn open_http(location: &str) -> IngestionResult<RawStream> {
    use std::time::Duration;

    // No overall timeout: bodies of large files stream for as long as they need.
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(None::<Duration>)
        .build()
        .map_err(|e| IngestionError::transport(location, e))?;
    let response = client
        .get(location)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| IngestionError::transport(location, e))?;
    Ok(RawStream::Generic(Box::new(response)))
}

#[cfg(not(feature = "http"))]
fn open_http(location: &str) -> IngestionResult<RawStream> {
    Err(IngestionError::transport(
        location,
        "http transport not enabled (enable cargo feature 'http')",
    ))
}
