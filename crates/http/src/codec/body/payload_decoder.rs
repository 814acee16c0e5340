//! Unified payload decoder dispatching on the body classification.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::byteranges_decoder::ByteRangesDecoder;
use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::body::until_close_decoder::UntilCloseDecoder;
use crate::protocol::{BodyKind, ParseError, PayloadItem, ProtocolViolation};

/// Decodes a message body according to its [`BodyKind`].
///
/// Multipart byteranges bodies stream raw bytes and terminate at their
/// closing delimiter; part parsing happens in the multipart reader. The
/// boundary lives in the header, so [`byteranges`] takes it explicitly and
/// the `From<BodyKind>` conversion falls back to close-delimited framing.
/// Websocket handshakes have no HTTP body, the remaining bytes belong to the
/// upgraded protocol.
///
/// [`byteranges`]: Self::byteranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    UntilClose(UntilCloseDecoder),
    ByteRanges(ByteRangesDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn fixed_length(length: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(length)) }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(UntilCloseDecoder::new()) }
    }

    pub fn byteranges(boundary: &str) -> Self {
        Self { kind: Kind::ByteRanges(ByteRangesDecoder::new(boundary)) }
    }

    /// Cumulative body bytes decoded so far.
    pub fn received(&self) -> u64 {
        match &self.kind {
            Kind::Length(d) => d.received(),
            Kind::Chunked(d) => d.received(),
            Kind::UntilClose(d) => d.received(),
            Kind::ByteRanges(d) => d.received(),
            Kind::NoBody => 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Length(d) => d.is_finished(),
            Kind::Chunked(d) => d.is_finished(),
            Kind::UntilClose(d) => d.is_finished(),
            Kind::ByteRanges(d) => d.is_finished(),
            Kind::NoBody => true,
        }
    }

    /// Trailer fields, present only after a chunked body completed with
    /// trailers.
    pub fn trailers(&self) -> &[(String, String)] {
        match &self.kind {
            Kind::Chunked(d) => d.trailers(),
            _ => &[],
        }
    }

    /// Classifies a transport disconnect observed mid-body.
    ///
    /// A close-delimited body completes normally; a fixed-length or chunked
    /// body short of completion is a protocol violation.
    pub fn on_disconnect(&mut self) -> Result<(), ProtocolViolation> {
        match &mut self.kind {
            Kind::Length(d) => d.on_disconnect(),
            Kind::Chunked(d) => d.on_disconnect(),
            Kind::UntilClose(d) => d.on_disconnect(),
            Kind::ByteRanges(d) => d.on_disconnect(),
            Kind::NoBody => Ok(()),
        }
    }
}

impl From<BodyKind> for PayloadDecoder {
    fn from(kind: BodyKind) -> Self {
        match kind {
            BodyKind::Empty | BodyKind::Websocket => Self::empty(),
            BodyKind::Length(n) => Self::fixed_length(n),
            BodyKind::Chunked => Self::chunked(),
            BodyKind::UntilClose => Self::until_close(),
            // the boundary is not part of the kind, callers holding the
            // header install a byteranges decoder instead
            BodyKind::MultipartByteRanges => Self::until_close(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::UntilClose(decoder) => decoder.decode(src),
            Kind::ByteRanges(decoder) => decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_selects_decoder() {
        assert!(PayloadDecoder::from(BodyKind::Empty).is_finished());
        assert!(PayloadDecoder::from(BodyKind::Websocket).is_finished());
        assert!(!PayloadDecoder::from(BodyKind::Length(5)).is_finished());
        assert!(!PayloadDecoder::from(BodyKind::Chunked).is_finished());
        assert!(!PayloadDecoder::from(BodyKind::UntilClose).is_finished());
        assert!(!PayloadDecoder::from(BodyKind::MultipartByteRanges).is_finished());
    }

    #[test]
    fn empty_yields_immediate_eof() {
        let mut decoder = PayloadDecoder::empty();
        let mut buffer = BytesMut::new();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn dispatches_to_byteranges() {
        let mut decoder = PayloadDecoder::byteranges("SEP");
        let mut buffer = BytesMut::from(&b"--SEP\r\n\r\nhi\r\n--SEP--\r\n"[..]);
        let mut saw_eof = false;
        while let Some(item) = decoder.decode(&mut buffer).unwrap() {
            if item.is_eof() {
                saw_eof = true;
                break;
            }
        }
        assert!(saw_eof);
        assert!(decoder.is_finished());
    }

    #[test]
    fn dispatches_to_chunked() {
        let mut decoder = PayloadDecoder::from(BodyKind::Chunked);
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n0\r\n\r\n"[..]);
        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().len(), 5);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
