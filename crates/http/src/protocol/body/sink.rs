//! Body data sinks for outgoing messages.
//!
//! A sink stages the head and body bytes of one message; the transport layer
//! drains the staged output with [`BodySink::take_output`]. The head is
//! written lazily on the first body write so framing headers can still be
//! rewritten when the body turns out to be empty.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Write;
use tracing::{debug, trace};

use crate::protocol::{MessageHead, SendError};

/// Lifecycle of a body sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SinkState {
    /// Accepting writes.
    Open,
    /// Close requested but deferred until sub-writers finish.
    Closing,
    /// Fully closed; writes fail.
    Closed,
}

/// Common surface of the frame sinks.
pub trait BodySink {
    /// Stages body bytes for sending.
    fn write(&mut self, bytes: Bytes) -> Result<(), SendError>;

    /// Finishes the body, staging any trailer framing.
    fn close(&mut self) -> Result<(), SendError>;

    /// Drains the bytes staged so far.
    fn take_output(&mut self) -> Bytes;

    fn state(&self) -> SinkState;

    /// The message head, writable until the first body write flushes it.
    fn head_mut(&mut self) -> &mut MessageHead;
}

/// Sink for a body with a declared Content-Length.
///
/// Overflow is a hard failure staging nothing; closing short of the declared
/// length fails with [`SendError::ClosedEarly`]. Closing with zero writes
/// rewrites the head to `Content-Length: 0`.
pub struct FixedLengthSink {
    head: MessageHead,
    declared: u64,
    written: u64,
    head_flushed: bool,
    state: SinkState,
    output: BytesMut,
}

impl FixedLengthSink {
    pub fn new(head: MessageHead, declared: u64) -> Self {
        Self { head, declared, written: 0, head_flushed: false, state: SinkState::Open, output: BytesMut::new() }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn flush_head(&mut self) -> Result<(), SendError> {
        if self.head_flushed {
            return Ok(());
        }
        self.head.header_mut().remove_header("Transfer-Encoding");
        self.head.header_mut().set_content_length(self.declared);
        self.head.encode(&mut self.output);
        self.head_flushed = true;
        Ok(())
    }
}

impl BodySink for FixedLengthSink {
    fn write(&mut self, bytes: Bytes) -> Result<(), SendError> {
        if self.state != SinkState::Open {
            return Err(SendError::Closed);
        }
        let len = bytes.len() as u64;
        if self.written + len > self.declared {
            return Err(SendError::Overflow { declared: self.declared, attempted: self.written + len });
        }
        self.flush_head()?;
        self.written += len;
        self.output.extend_from_slice(&bytes);
        trace!(len, written = self.written, "fixed-length sink wrote bytes");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SendError> {
        match self.state {
            SinkState::Closed => return Ok(()),
            SinkState::Open | SinkState::Closing => {}
        }
        if self.written == 0 && !self.head_flushed {
            // nothing written: the head has not gone out yet, rewrite it
            self.head.header_mut().remove_header("Transfer-Encoding");
            self.head.header_mut().set_content_length(0);
            self.head.encode(&mut self.output);
            self.head_flushed = true;
        } else if self.written < self.declared {
            return Err(SendError::ClosedEarly { declared: self.declared, written: self.written });
        }
        self.state = SinkState::Closed;
        debug!(written = self.written, "fixed-length sink closed");
        Ok(())
    }

    fn take_output(&mut self) -> Bytes {
        let len = self.output.len();
        self.output.split_to(len).freeze()
    }

    fn state(&self) -> SinkState {
        self.state
    }

    fn head_mut(&mut self) -> &mut MessageHead {
        &mut self.head
    }
}

/// Sink emitting the chunked transfer coding.
///
/// The first write stages the head with `Transfer-Encoding: chunked`; each
/// non-empty write becomes one chunk frame; close stages the terminal
/// `0\r\n\r\n`. Closing with zero writes instead rewrites the head to a
/// plain `Content-Length: 0` message.
pub struct ChunkedSink {
    head: MessageHead,
    head_flushed: bool,
    state: SinkState,
    output: BytesMut,
}

impl ChunkedSink {
    pub fn new(head: MessageHead) -> Self {
        Self { head, head_flushed: false, state: SinkState::Open, output: BytesMut::new() }
    }

    fn flush_head(&mut self) -> Result<(), SendError> {
        if self.head_flushed {
            return Ok(());
        }
        self.head.header_mut().remove_header("Content-Length");
        self.head.header_mut().set_header("Transfer-Encoding", "chunked").map_err(SendError::invalid_body)?;
        self.head.encode(&mut self.output);
        self.head_flushed = true;
        Ok(())
    }
}

impl BodySink for ChunkedSink {
    fn write(&mut self, bytes: Bytes) -> Result<(), SendError> {
        if self.state != SinkState::Open {
            return Err(SendError::Closed);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        self.flush_head()?;
        self.output.reserve(bytes.len() + 20);
        let mut writer = (&mut self.output).writer();
        write!(writer, "{:X}\r\n", bytes.len()).map_err(SendError::io)?;
        let output = writer.get_mut();
        output.extend_from_slice(&bytes);
        output.extend_from_slice(b"\r\n");
        trace!(len = bytes.len(), "chunked sink wrote frame");
        Ok(())
    }

    fn close(&mut self) -> Result<(), SendError> {
        match self.state {
            SinkState::Closed => return Ok(()),
            SinkState::Open | SinkState::Closing => {}
        }
        if self.head_flushed {
            self.output.extend_from_slice(b"0\r\n\r\n");
        } else {
            // no frame went out: send a plain empty message instead
            self.head.header_mut().remove_header("Transfer-Encoding");
            self.head.header_mut().set_content_length(0);
            self.head.encode(&mut self.output);
            self.head_flushed = true;
        }
        self.state = SinkState::Closed;
        debug!("chunked sink closed");
        Ok(())
    }

    fn take_output(&mut self) -> Bytes {
        let len = self.output.len();
        self.output.split_to(len).freeze()
    }

    fn state(&self) -> SinkState {
        self.state
    }

    fn head_mut(&mut self) -> &mut MessageHead {
        &mut self.head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseHeader;
    use http::StatusCode;

    fn head() -> MessageHead {
        ResponseHeader::new(StatusCode::OK).into()
    }

    #[test]
    fn fixed_length_lazy_head_then_body() {
        let mut sink = FixedLengthSink::new(head(), 5);
        assert!(sink.take_output().is_empty());

        sink.write(Bytes::from_static(b"hello")).unwrap();
        sink.close().unwrap();

        let out = String::from_utf8(sink.take_output().to_vec()).unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Length: 5\r\n"));
        assert!(out.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn fixed_length_overflow_stages_nothing() {
        let mut sink = FixedLengthSink::new(head(), 3);
        let err = sink.write(Bytes::from_static(b"hello")).unwrap_err();
        assert!(matches!(err, SendError::Overflow { declared: 3, attempted: 5 }));
        assert!(sink.take_output().is_empty());
    }

    #[test]
    fn fixed_length_close_early_fails() {
        let mut sink = FixedLengthSink::new(head(), 10);
        sink.write(Bytes::from_static(b"hi")).unwrap();
        assert!(matches!(sink.close(), Err(SendError::ClosedEarly { declared: 10, written: 2 })));
    }

    #[test]
    fn fixed_length_empty_close_rewrites_length() {
        let mut sink = FixedLengthSink::new(head(), 100);
        sink.close().unwrap();
        let out = String::from_utf8(sink.take_output().to_vec()).unwrap();
        assert!(out.contains("Content-Length: 0\r\n"));
        assert_eq!(sink.state(), SinkState::Closed);
    }

    #[test]
    fn chunked_frames_and_terminator() {
        let mut sink = ChunkedSink::new(head());
        sink.write(Bytes::from_static(b"Wiki")).unwrap();
        sink.write(Bytes::from_static(b"pedia")).unwrap();
        sink.close().unwrap();

        let out = String::from_utf8(sink.take_output().to_vec()).unwrap();
        assert!(out.contains("Transfer-Encoding: chunked\r\n"));
        assert!(out.ends_with("\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"));
    }

    #[test]
    fn chunked_zero_write_close_swaps_framing() {
        let mut sink = ChunkedSink::new(head());
        sink.close().unwrap();
        let out = String::from_utf8(sink.take_output().to_vec()).unwrap();
        assert!(out.contains("Content-Length: 0\r\n"));
        assert!(!out.contains("Transfer-Encoding"));
    }

    #[test]
    fn write_after_close_fails() {
        let mut sink = ChunkedSink::new(head());
        sink.close().unwrap();
        assert!(matches!(sink.write(Bytes::from_static(b"x")), Err(SendError::Closed)));
        // double close is a no-op
        assert!(sink.close().is_ok());
    }

    #[test]
    fn incremental_take_output() {
        let mut sink = ChunkedSink::new(head());
        sink.write(Bytes::from_static(b"one")).unwrap();
        let first = sink.take_output();
        assert!(!first.is_empty());

        sink.write(Bytes::from_static(b"two")).unwrap();
        let second = sink.take_output();
        assert_eq!(&second[..], b"3\r\ntwo\r\n");
    }
}
