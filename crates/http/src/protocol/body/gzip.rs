//! Gzip compression and decompression filters for body data.
//!
//! Compression uses the RFC 1952 container via `flate2`. The sink decides
//! between plain and gzip mode lazily on the first write, so small bodies
//! skip the compression overhead entirely.

use bytes::{Bytes, BytesMut};
use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Write;
use tracing::{debug, trace};

use crate::protocol::body::sink::{BodySink, SinkState};
use crate::protocol::body::source::BodySource;
use crate::protocol::{MessageHead, SendError, SourceError};

/// Length of the fixed RFC 1952 member header.
const GZIP_HEADER_LEN: usize = 10;

enum Mode {
    Plain,
    Gzip(GzEncoder<Vec<u8>>),
}

/// Compressing sink wrapper.
///
/// The mode is fixed on the first write: gzip when the head already declares
/// `Content-Encoding: gzip`, or when the first write alone exceeds the
/// configured threshold; plain otherwise. In gzip mode the header is set
/// before the inner sink flushes its head.
pub struct GzipSink<S: BodySink> {
    inner: S,
    threshold: usize,
    mode: Option<Mode>,
}

impl<S: BodySink> GzipSink<S> {
    pub fn new(inner: S, threshold: usize) -> Self {
        Self { inner, threshold, mode: None }
    }

    fn decide_mode(&mut self, first_write_len: usize) -> Result<(), SendError> {
        let declared_gzip = self
            .inner
            .head_mut()
            .header()
            .get_header("Content-Encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

        if declared_gzip || first_write_len > self.threshold {
            if !declared_gzip {
                self.inner.head_mut().header_mut().set_header("Content-Encoding", "gzip").map_err(SendError::invalid_body)?;
            }
            debug!(first_write_len, threshold = self.threshold, "gzip mode selected");
            self.mode = Some(Mode::Gzip(GzEncoder::new(Vec::new(), Compression::default())));
        } else {
            trace!(first_write_len, "plain mode selected");
            self.mode = Some(Mode::Plain);
        }
        Ok(())
    }
}

impl<S: BodySink> BodySink for GzipSink<S> {
    fn write(&mut self, bytes: Bytes) -> Result<(), SendError> {
        if self.mode.is_none() {
            self.decide_mode(bytes.len())?;
        }
        match self.mode.as_mut().unwrap() {
            Mode::Plain => self.inner.write(bytes),
            Mode::Gzip(encoder) => {
                encoder.write_all(&bytes).map_err(SendError::io)?;
                encoder.flush().map_err(SendError::io)?;
                let compressed = std::mem::take(encoder.get_mut());
                if !compressed.is_empty() {
                    self.inner.write(Bytes::from(compressed))?;
                }
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<(), SendError> {
        match self.mode.take() {
            None | Some(Mode::Plain) => self.inner.close(),
            Some(Mode::Gzip(encoder)) => {
                let tail = encoder.finish().map_err(SendError::io)?;
                if !tail.is_empty() {
                    self.inner.write(Bytes::from(tail))?;
                }
                self.inner.close()
            }
        }
    }

    fn take_output(&mut self) -> Bytes {
        self.inner.take_output()
    }

    fn state(&self) -> SinkState {
        self.inner.state()
    }

    fn head_mut(&mut self) -> &mut MessageHead {
        self.inner.head_mut()
    }
}

/// Decompressing source filter.
///
/// Compressed bytes are appended as they arrive; nothing is emitted until
/// the full 10-byte member header is buffered, then data inflates
/// incrementally into the wrapped plain-text source.
pub struct GzipBodySource {
    output: BodySource,
    header_buf: BytesMut,
    decoder: Option<GzDecoder<Vec<u8>>>,
}

impl GzipBodySource {
    pub fn new() -> Self {
        Self { output: BodySource::new(), header_buf: BytesMut::new(), decoder: None }
    }

    /// The plain-text side consumers read from.
    pub fn source(&self) -> &BodySource {
        &self.output
    }

    /// Feeds compressed bytes from the wire.
    pub fn append(&mut self, bytes: Bytes) -> Result<(), SourceError> {
        if self.decoder.is_none() {
            self.header_buf.extend_from_slice(&bytes);
            if self.header_buf.len() < GZIP_HEADER_LEN {
                // wait silently for the member header
                return Ok(());
            }
            trace!("gzip member header complete, starting inflate");
            self.decoder = Some(GzDecoder::new(Vec::new()));
            let buffered = self.header_buf.split().freeze();
            return self.inflate(&buffered);
        }
        self.inflate(&bytes)
    }

    fn inflate(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        let decoder = self.decoder.as_mut().unwrap();
        decoder
            .write_all(bytes)
            .and_then(|_| decoder.flush())
            .map_err(|e| SourceError::Destroyed { reason: format!("gzip inflate failed: {e}") })?;
        let plain = std::mem::take(decoder.get_mut());
        if !plain.is_empty() {
            self.output.append(Bytes::from(plain))?;
        }
        Ok(())
    }

    /// Finishes decompression and completes the plain-text source.
    pub fn set_complete(&mut self) -> Result<(), SourceError> {
        if let Some(decoder) = self.decoder.take() {
            let tail = decoder
                .finish()
                .map_err(|e| SourceError::Destroyed { reason: format!("gzip stream truncated: {e}") })?;
            if !tail.is_empty() {
                self.output.append(Bytes::from(tail))?;
            }
        }
        self.output.set_complete();
        Ok(())
    }

    pub fn destroy(&mut self, reason: impl Into<String>) {
        self.decoder.take();
        self.output.destroy(reason);
    }
}

impl Default for GzipBodySource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body::sink::ChunkedSink;
    use crate::protocol::ResponseHeader;
    use http::StatusCode;

    fn gzip_bytes(plain: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        encoder.finish().unwrap()
    }

    fn chunked() -> ChunkedSink {
        ChunkedSink::new(ResponseHeader::new(StatusCode::OK).into())
    }

    #[test]
    fn small_first_write_stays_plain() {
        let mut sink = GzipSink::new(chunked(), 4096);
        sink.write(Bytes::from_static(b"tiny")).unwrap();
        sink.close().unwrap();

        let out = String::from_utf8(sink.take_output().to_vec()).unwrap();
        assert!(!out.contains("Content-Encoding"));
        assert!(out.contains("4\r\ntiny\r\n"));
    }

    #[test]
    fn large_first_write_switches_to_gzip() {
        let mut sink = GzipSink::new(chunked(), 64);
        let body = vec![b'a'; 1024];
        sink.write(Bytes::from(body)).unwrap();
        sink.close().unwrap();

        let out = sink.take_output();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Content-Encoding: gzip"));
    }

    #[test]
    fn declared_gzip_compresses_regardless_of_size() {
        let mut inner = chunked();
        inner.head_mut().header_mut().set_header("Content-Encoding", "gzip").unwrap();
        let mut sink = GzipSink::new(inner, usize::MAX);
        sink.write(Bytes::from_static(b"small body")).unwrap();
        sink.close().unwrap();

        let out = sink.take_output();
        // the staged body is a valid gzip stream, not the plain text
        assert!(!out.windows(10).any(|w| w == b"small body"));
    }

    #[test]
    fn round_trip_through_source() {
        let plain = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = gzip_bytes(&plain);

        let mut source = GzipBodySource::new();
        // feed in small slices to exercise incremental inflate
        for piece in compressed.chunks(7) {
            source.append(Bytes::copy_from_slice(piece)).unwrap();
        }
        source.set_complete().unwrap();

        assert!(source.source().is_complete());
        let inflated = source.source().read_available().unwrap();
        assert_eq!(&inflated[..], &plain[..]);
    }

    #[test]
    fn buffers_silently_below_header_length() {
        let mut source = GzipBodySource::new();
        source.append(Bytes::from_static(&[0x1f, 0x8b, 0x08])).unwrap();
        assert_eq!(source.source().available(), Some(0));
    }

    #[test]
    fn truncated_stream_fails_on_complete() {
        let compressed = gzip_bytes(b"some reasonable amount of data here");
        let mut source = GzipBodySource::new();
        source.append(Bytes::copy_from_slice(&compressed[..compressed.len() - 4])).unwrap();
        assert!(source.set_complete().is_err());
    }
}
