//! Decoder for `multipart/byteranges` bodies without a declared length.
//!
//! The body is self-delimiting: it ends at the closing delimiter
//! `--boundary--` on its own line. Raw bytes stream through unchanged so the
//! consumer can run the part-level multipart parser over them; this decoder
//! only decides where the message stops, keeping the connection reusable.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem, ProtocolViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Streaming part bytes, scanning for the closing delimiter.
    Streaming,
    /// The closing delimiter was emitted; its terminating CRLF is pending.
    Draining,
    /// The body ended.
    Finished,
}

/// Incremental decoder for byterange bodies delimited by their closing
/// boundary.
///
/// Re-entrant like the other payload decoders: a delimiter split across
/// reads is held back until it can be told apart from part data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRangesDecoder {
    /// `\r\n--boundary--`, the line break preceding the closing delimiter
    /// included.
    terminator: Vec<u8>,
    received: u64,
    state: State,
}

impl ByteRangesDecoder {
    pub fn new(boundary: &str) -> Self {
        let mut terminator = Vec::with_capacity(boundary.len() + 6);
        terminator.extend_from_slice(b"\r\n--");
        terminator.extend_from_slice(boundary.as_bytes());
        terminator.extend_from_slice(b"--");
        Self { terminator, received: 0, state: State::Streaming }
    }

    /// Cumulative body bytes decoded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_finished(&self) -> bool {
        self.state != State::Streaming
    }

    /// Handles a transport disconnect. A close before the closing delimiter
    /// is a protocol violation; one after it ends the body.
    pub fn on_disconnect(&mut self) -> Result<(), ProtocolViolation> {
        match self.state {
            State::Streaming => Err(ProtocolViolation::new(
                "read-byteranges",
                self.received,
                "connection closed before the closing boundary",
            )),
            State::Draining | State::Finished => {
                self.state = State::Finished;
                Ok(())
            }
        }
    }

    fn emit(&mut self, src: &mut BytesMut, len: usize) -> PayloadItem {
        let bytes = src.split_to(len).freeze();
        self.received += bytes.len() as u64;
        PayloadItem::Chunk(bytes)
    }
}

impl Decoder for ByteRangesDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.state {
            State::Streaming => {
                // an empty message closes immediately, without a part before
                // the delimiter there is no preceding CRLF
                let bare = &self.terminator[2..];
                if self.received == 0 && src.len() >= bare.len() && src.starts_with(bare) {
                    self.state = State::Draining;
                    return Ok(Some(self.emit(src, bare.len())));
                }
                if self.received == 0 && bare.starts_with(&src[..]) {
                    return Ok(None);
                }

                match find(src, &self.terminator) {
                    Some(pos) => {
                        self.state = State::Draining;
                        let len = pos + self.terminator.len();
                        trace!(body_bytes = self.received + pos as u64, "closing boundary found");
                        Ok(Some(self.emit(src, len)))
                    }
                    None => {
                        // hold back a tail that could still begin the
                        // delimiter
                        if src.len() >= self.terminator.len() {
                            let safe = src.len() - self.terminator.len() + 1;
                            return Ok(Some(self.emit(src, safe)));
                        }
                        Ok(None)
                    }
                }
            }

            State::Draining => {
                if src.len() < 2 {
                    return Ok(None);
                }
                if &src[..2] == b"\r\n" {
                    let _ = src.split_to(2);
                }
                self.state = State::Finished;
                Ok(Some(PayloadItem::Eof))
            }

            State::Finished => Ok(None),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut ByteRangesDecoder, buf: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        let mut eof = false;
        while let Some(item) = decoder.decode(buf).unwrap() {
            match item {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Eof => {
                    eof = true;
                    break;
                }
            }
        }
        (body, eof)
    }

    #[test]
    fn terminates_at_closing_boundary() {
        let payload = "--SEP\r\nContent-Range: bytes 0-4/10\r\n\r\nhello\r\n--SEP--\r\nGET /next";
        let mut decoder = ByteRangesDecoder::new("SEP");
        let mut buf = BytesMut::from(payload);

        let (body, eof) = drain(&mut decoder, &mut buf);
        assert!(eof);
        assert!(decoder.is_finished());
        // everything through the closing delimiter streams to the consumer
        assert!(body.ends_with(b"--SEP--"));
        // pipelined bytes after the body stay in the buffer
        assert_eq!(&buf[..], b"GET /next");
    }

    #[test]
    fn survives_split_delimiter() {
        let payload = b"--SEP\r\n\r\ndata bytes\r\n--SEP--\r\n";
        for split in 1..payload.len() {
            let mut decoder = ByteRangesDecoder::new("SEP");
            let mut buf = BytesMut::from(&payload[..split]);

            let (mut body, mut eof) = drain(&mut decoder, &mut buf);
            if !eof {
                buf.extend_from_slice(&payload[split..]);
                let (rest, end) = drain(&mut decoder, &mut buf);
                body.extend_from_slice(&rest);
                eof = end;
            }
            assert!(eof, "split at {split}");
            assert!(body.ends_with(b"--SEP--"), "split at {split}");
        }
    }

    #[test]
    fn empty_message_closes_immediately() {
        let mut decoder = ByteRangesDecoder::new("SEP");
        let mut buf = BytesMut::from("--SEP--\r\n");
        let (body, eof) = drain(&mut decoder, &mut buf);
        assert!(eof);
        assert_eq!(&body[..], b"--SEP--");
    }

    #[test]
    fn disconnect_before_closing_boundary_is_violation() {
        let mut decoder = ByteRangesDecoder::new("SEP");
        let mut buf = BytesMut::from("--SEP\r\n\r\ntruncated part");
        let _ = drain(&mut decoder, &mut buf);

        let violation = decoder.on_disconnect().unwrap_err();
        assert_eq!(violation.state, "read-byteranges");
    }
}
