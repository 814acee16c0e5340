//! Decoder for fixed-length bodies framed by Content-Length.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem, ProtocolViolation};

/// Decodes exactly `length` body bytes, then yields EOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: u64,
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length, remaining: length }
    }

    /// Cumulative body bytes decoded so far.
    pub fn received(&self) -> u64 {
        self.length - self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Handles a transport disconnect. A close before the declared length is
    /// exhausted is a protocol violation.
    pub fn on_disconnect(&self) -> Result<(), ProtocolViolation> {
        if self.remaining == 0 {
            Ok(())
        } else {
            Err(ProtocolViolation::new(
                "read-fixed-length",
                self.received(),
                format!("connection closed with {} of {} body bytes outstanding", self.remaining, self.length),
            ))
        }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            trace!(length = self.length, "finished reading fixed-length data");
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        let read_size = std::cmp::min(remaining, src.len());
        self.remaining -= read_size as u64;

        let bytes = src.split_to(read_size).freeze();
        trace!(len = bytes.len(), "read fixed-length bytes");
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}
