//! Decompression decorators over a [`RawStream`].
//!
//! Whatever the transport and codec, readers only ever see an [`InputStream`].

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use crc32fast::Hasher;
use flate2::read::{DeflateDecoder, MultiGzDecoder};
use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

use crate::error::{IngestionError, IngestionResult};
use crate::types::Compression;

use super::params::ResolvedParams;
use super::transport::{RawStream, Transport};

/// Uniform buffered byte stream handed to the CSV and JSON readers.
pub struct InputStream {
    inner: Box<dyn BufRead + Send>,
}

impl InputStream {
    /// Wrap any buffered reader.
    pub fn new(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            inner: Box::new(reader),
        }
    }

    /// An in-memory stream, mostly useful in tests.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(io::Cursor::new(bytes.into()))
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InputStream")
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for InputStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// Open the decompressed stream for a resolved file.
pub fn open_stream(transport: &Transport, params: &ResolvedParams) -> IngestionResult<InputStream> {
    let raw = transport.open(&params.url, &params.source)?;
    decompress(raw, params.compression, &params.url)
}

/// Apply `compression` to a raw stream.
pub fn decompress(raw: RawStream, compression: Compression, url: &str) -> IngestionResult<InputStream> {
    match compression {
        Compression::None => Ok(InputStream::new(BufReader::new(raw))),
        Compression::Gzip => {
            let mut reader = BufReader::new(MultiGzDecoder::new(raw));
            // Surface a bad gzip header as an open failure rather than a mid-stream read error.
            reader
                .fill_buf()
                .map_err(|e| IngestionError::transport(url, format!("invalid gzip stream: {e}")))?;
            Ok(InputStream::new(reader))
        }
        Compression::Zip => open_first_zip_entry(raw, url),
    }
}

struct ZipEntry {
    name: String,
    method: CompressionMethod,
    data_start: u64,
    compressed_size: u64,
    crc32: u32,
}

/// Checks the CRC-32 of a zip entry's decoded bytes once the entry is fully read.
struct CrcVerifier<R> {
    inner: R,
    hasher: Hasher,
    expected: u32,
    name: String,
    verified: bool,
}

impl<R> CrcVerifier<R> {
    fn new(inner: R, expected: u32, name: String) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            expected,
            name,
            verified: false,
        }
    }
}

impl<R: Read> Read for CrcVerifier<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        } else if !buf.is_empty() && !self.verified {
            let actual = self.hasher.clone().finalize();
            if actual != self.expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "zip entry '{}' failed its checksum (expected {:08x}, got {actual:08x})",
                        self.name, self.expected
                    ),
                ));
            }
            self.verified = true;
        }
        Ok(n)
    }
}

/// Stream the first file entry of a zip archive. Later entries are ignored.
fn open_first_zip_entry(raw: RawStream, url: &str) -> IngestionResult<InputStream> {
    let source = raw
        .into_seekable()
        .map_err(|e| IngestionError::transport(url, e))?;
    let mut archive = ZipArchive::new(source)
        .map_err(|e| IngestionError::transport(url, format!("invalid zip archive: {e}")))?;

    let mut first = None;
    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .map_err(|e| IngestionError::transport(url, format!("invalid zip entry: {e}")))?;
        if file.is_dir() {
            continue;
        }
        if file.encrypted() {
            return Err(IngestionError::transport(
                url,
                format!("zip entry '{}' is encrypted", file.name()),
            ));
        }
        first = Some(ZipEntry {
            name: file.name().to_string(),
            method: file.compression(),
            data_start: file.data_start(),
            compressed_size: file.compressed_size(),
            crc32: file.crc32(),
        });
        break;
    }

    let entry = first.ok_or_else(|| IngestionError::transport(url, "zip archive has no file entries"))?;
    if archive.len() > 1 {
        debug!(entries = archive.len(), entry = %entry.name, "zip archive has several entries; reading the first");
    }

    let mut inner = archive.into_inner();
    inner
        .seek(SeekFrom::Start(entry.data_start))
        .map_err(|e| IngestionError::transport(url, e))?;
    let body = inner.take(entry.compressed_size);

    let decoded: Box<dyn Read + Send> = match entry.method {
        CompressionMethod::Stored => Box::new(body),
        CompressionMethod::Deflated => Box::new(DeflateDecoder::new(body)),
        other => {
            return Err(IngestionError::transport(
                url,
                format!("zip entry '{}' uses unsupported method {other:?}", entry.name),
            ))
        }
    };
    let verified = CrcVerifier::new(decoded, entry.crc32, entry.name);
    Ok(InputStream::new(BufReader::new(verified)))
}
