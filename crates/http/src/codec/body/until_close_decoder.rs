//! Decoder for bodies delimited by connection close.
//!
//! Used for HTTP/0.9 style simple bodies and responses that declare neither
//! a length nor a transfer coding. All incoming bytes belong to the body;
//! the transport closing is the normal end of message, never an error.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem, ProtocolViolation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntilCloseDecoder {
    received: u64,
    closed: bool,
}

impl UntilCloseDecoder {
    pub fn new() -> Self {
        Self { received: 0, closed: false }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_finished(&self) -> bool {
        self.closed
    }

    /// A disconnect completes the body.
    pub fn on_disconnect(&mut self) -> Result<(), ProtocolViolation> {
        self.closed = true;
        trace!(received = self.received, "close delimited body complete");
        Ok(())
    }
}

impl Default for UntilCloseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let bytes = src.split_to(src.len()).freeze();
            self.received += bytes.len() as u64;
            return Ok(Some(PayloadItem::Chunk(bytes)));
        }
        if self.closed {
            return Ok(Some(PayloadItem::Eof));
        }
        Ok(None)
    }
}
