//! Unified payload encoder dispatching on the body classification.

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{BodyKind, PayloadItem, SendError};

/// Encodes a message body according to its [`BodyKind`].
///
/// Close-delimited bodies are written raw; the caller ends them by closing
/// the transport.
pub struct PayloadEncoder {
    kind: Kind,
}

enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    Raw { finished: bool },
    NoBody,
}

impl PayloadEncoder {
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Length(e) => e.is_finished(),
            Kind::Chunked(e) => e.is_finished(),
            Kind::Raw { finished } => *finished,
            Kind::NoBody => true,
        }
    }
}

impl From<BodyKind> for PayloadEncoder {
    fn from(kind: BodyKind) -> Self {
        let kind = match kind {
            BodyKind::Empty | BodyKind::Websocket => Kind::NoBody,
            BodyKind::Length(n) => Kind::Length(LengthEncoder::new(n)),
            BodyKind::Chunked => Kind::Chunked(ChunkedEncoder::new()),
            BodyKind::UntilClose | BodyKind::MultipartByteRanges => Kind::Raw { finished: false },
        };
        Self { kind }
    }
}

impl Encoder<PayloadItem> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::Raw { finished } => {
                match item {
                    PayloadItem::Chunk(bytes) => dst.extend_from_slice(&bytes),
                    PayloadItem::Eof => *finished = true,
                }
                Ok(())
            }
            Kind::NoBody => match item {
                PayloadItem::Eof => Ok(()),
                PayloadItem::Chunk(bytes) if bytes.is_empty() => Ok(()),
                PayloadItem::Chunk(_) => Err(SendError::invalid_body("message classified as bodyless")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn bodyless_rejects_data() {
        let mut encoder = PayloadEncoder::from(BodyKind::Empty);
        let mut dst = BytesMut::new();
        assert!(encoder.encode(PayloadItem::Eof, &mut dst).is_ok());
        assert!(encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"x")), &mut dst).is_err());
    }

    #[test]
    fn dispatches_to_chunked() {
        let mut encoder = PayloadEncoder::from(BodyKind::Chunked);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Eof, &mut dst).unwrap();
        assert_eq!(&dst[..], b"5\r\nhello\r\n0\r\n\r\n");
    }

    #[test]
    fn raw_passthrough_for_until_close() {
        let mut encoder = PayloadEncoder::from(BodyKind::UntilClose);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"stream")), &mut dst).unwrap();
        assert_eq!(&dst[..], b"stream");
    }
}
