//! Decoder for the HTTP chunked transfer coding.
//!
//! Chunk format: a hexadecimal length field, optionally followed by a
//! `;`-delimited chunk extension (ignored), CRLF, the chunk data, CRLF. A
//! zero-length chunk transitions to trailer parsing; trailer fields reuse
//! the header-line folding rules and are kept for the caller.

use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::io::ErrorKind;
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::lines;
use crate::protocol::{ParseError, PayloadItem, ProtocolViolation};

use ChunkedState::*;

/// Incremental decoder for chunked bodies.
///
/// The decoder is re-entrant: when the buffer runs dry mid-chunk it returns
/// `Ok(None)` and resumes from the same state on the next call. Cumulative
/// received sizes are tracked for disconnect diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    received: u64,
    trailer_buf: BytesMut,
    trailers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skip the chunk extension
    Extension,
    /// LF closing the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Trailer field bytes
    Trailer,
    /// LF closing one trailer line
    TrailerLf,
    /// CR of the final empty line
    EndCr,
    /// LF of the final empty line
    EndLf,
    /// Final state after the last chunk
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, received: 0, trailer_buf: BytesMut::new(), trailers: Vec::new() }
    }

    /// Cumulative body bytes decoded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    /// Trailer fields received after the final chunk.
    pub fn trailers(&self) -> &[(String, String)] {
        &self.trailers
    }

    /// The name of the current parser state, for diagnostics.
    pub fn state_name(&self) -> &'static str {
        match self.state {
            Size | SizeLws | Extension | SizeLf => "read-length-field",
            Body => "read-content",
            BodyCr | BodyLf => "read-content-crlf",
            Trailer | TrailerLf | EndCr | EndLf => "read-trailer",
            End => "complete",
        }
    }

    /// Handles a transport disconnect. Anything short of the final state is
    /// a protocol violation reported with the cumulative received size.
    pub fn on_disconnect(&self) -> Result<(), ProtocolViolation> {
        if self.state == End {
            Ok(())
        } else {
            Err(ProtocolViolation::new(self.state_name(), self.received, "connection closed before final chunk"))
        }
    }

    fn step(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, io::Error>> {
        macro_rules! next_byte {
            () => {{
                if src.is_empty() {
                    return Poll::Pending;
                }
                src.get_u8()
            }};
        }

        macro_rules! or_overflow {
            ($e:expr) => {
                match $e {
                    Some(val) => val,
                    None => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "chunk length overflow"))),
                }
            };
        }

        let next = match self.state {
            Size => match next_byte!() {
                b @ b'0'..=b'9' => {
                    self.remaining_size = or_overflow!(self.remaining_size.checked_mul(16));
                    self.remaining_size = or_overflow!(self.remaining_size.checked_add((b - b'0') as u64));
                    Size
                }
                b @ b'a'..=b'f' => {
                    self.remaining_size = or_overflow!(self.remaining_size.checked_mul(16));
                    self.remaining_size = or_overflow!(self.remaining_size.checked_add((b + 10 - b'a') as u64));
                    Size
                }
                b @ b'A'..=b'F' => {
                    self.remaining_size = or_overflow!(self.remaining_size.checked_mul(16));
                    self.remaining_size = or_overflow!(self.remaining_size.checked_add((b + 10 - b'A') as u64));
                    Size
                }
                b'\t' | b' ' => SizeLws,
                b';' => Extension,
                b'\r' => SizeLf,
                _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk size"))),
            },

            // whitespace may follow the size, but no further digits
            SizeLws => match next_byte!() {
                b'\t' | b' ' => SizeLws,
                b';' => Extension,
                b'\r' => SizeLf,
                _ => {
                    return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk size whitespace")))
                }
            },

            // extensions end at CRLF; a bare LF inside one is rejected
            Extension => match next_byte!() {
                b'\r' => SizeLf,
                b'\n' => {
                    return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "newline inside chunk extension")))
                }
                _ => Extension,
            },

            SizeLf => match next_byte!() {
                b'\n' => {
                    if self.remaining_size == 0 {
                        EndCr
                    } else {
                        Body
                    }
                }
                _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk size LF"))),
            },

            Body => {
                if src.is_empty() {
                    return Poll::Pending;
                }
                if self.remaining_size == 0 {
                    BodyCr
                } else {
                    let remaining = usize::try_from(self.remaining_size).unwrap_or(usize::MAX);
                    let read_size = std::cmp::min(remaining, src.len());
                    self.remaining_size -= read_size as u64;
                    self.received += read_size as u64;
                    *buf = Some(src.split_to(read_size).freeze());
                    if self.remaining_size > 0 {
                        Body
                    } else {
                        BodyCr
                    }
                }
            }

            BodyCr => match next_byte!() {
                b'\r' => BodyLf,
                _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk body CR"))),
            },

            BodyLf => match next_byte!() {
                b'\n' => Size,
                _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk body LF"))),
            },

            Trailer => match next_byte!() {
                b'\r' => {
                    self.trailer_buf.extend_from_slice(b"\r");
                    TrailerLf
                }
                b => {
                    self.trailer_buf.extend_from_slice(&[b]);
                    Trailer
                }
            },

            TrailerLf => match next_byte!() {
                b'\n' => {
                    self.trailer_buf.extend_from_slice(b"\n");
                    EndCr
                }
                _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid trailer LF"))),
            },

            EndCr => match next_byte!() {
                b'\r' => EndLf,
                b => {
                    // not the final empty line: a trailer field begins here
                    self.trailer_buf.extend_from_slice(&[b]);
                    Trailer
                }
            },

            EndLf => match next_byte!() {
                b'\n' => End,
                _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk end LF"))),
            },

            End => End,
        };

        Poll::Ready(Ok(next))
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked data from the buffer.
    ///
    /// Returns `Ok(Some(Chunk))` for each piece of chunk data,
    /// `Ok(Some(Eof))` after the terminal chunk, `Ok(None)` when more input
    /// is needed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!(received = self.received, "finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;
            self.state = match self.step(src, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(ParseError::io(e)),
            };

            if self.state == End && !self.trailer_buf.is_empty() {
                self.trailers = lines::parse_header_lines(&self.trailer_buf)?;
            }

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}
