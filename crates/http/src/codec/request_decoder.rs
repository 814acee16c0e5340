//! Request decoder (server role).
//!
//! Coordinates header parsing and payload decoding through a two-phase state
//! machine, yielding a stream of [`Message`] items: one header, then zero or
//! more chunks, then EOF. After EOF the decoder returns to the header phase,
//! so pipelined requests left in the buffer decode on subsequent calls
//! without recursion.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::RequestHeaderDecoder;
use crate::config::HttpOptions;
use crate::protocol::{BodyKind, HttpError, Message, ParseError, PayloadItem, RequestHeader};

/// A decoder for HTTP requests that handles both headers and payload.
///
/// State is carried by `payload_decoder`:
/// - `None`: parsing a header block
/// - `Some(_)`: parsing the body of the current request
pub struct RequestDecoder {
    header_decoder: RequestHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new(options: &HttpOptions) -> Self {
        Self { header_decoder: RequestHeaderDecoder::new(options), payload_decoder: None }
    }

    /// True while a message body is being received.
    pub fn is_receiving_body(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// Classifies a transport disconnect against the decoder state.
    ///
    /// - mid-body: delegated to the payload decoder (a close-delimited body
    ///   completes, a framed body reports a protocol violation)
    /// - mid-header with buffered bytes: the message is malformed and the
    ///   partial bytes are reported
    /// - between messages with an empty buffer: a normal connection end
    pub fn on_disconnect(&mut self, src: &BytesMut) -> Result<(), HttpError> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            payload_decoder.on_disconnect()?;
            return Ok(());
        }
        if !src.is_empty() {
            return Err(ParseError::malformed("connection closed inside a header block", src.clone().freeze()).into());
        }
        Ok(())
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(&HttpOptions::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, BodyKind)>;
    type Error = ParseError;

    /// Attempts to decode a request item from the buffer.
    ///
    /// - `Ok(Some(Message::Header(_)))`: a complete header block was parsed
    /// - `Ok(Some(Message::Payload(_)))`: a body chunk or the EOF marker
    /// - `Ok(None)`: more data needed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // body finished, next call parses the next header
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, body_kind)) => {
                self.payload_decoder = Some(body_kind.into());
                Some(Message::Header((header, body_kind)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;

    fn drain(decoder: &mut RequestDecoder, buf: &mut BytesMut) -> Vec<Message<(RequestHeader, BodyKind)>> {
        let mut items = Vec::new();
        while let Some(item) = decoder.decode(buf).unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn header_then_body_then_eof() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");

        let items = drain(&mut decoder, &mut buf);
        assert_eq!(items.len(), 3);
        assert!(items[0].is_header());
        assert_eq!(items[1].as_payload_bytes(), Some(&Bytes::from_static(b"hello")));
        assert!(matches!(&items[2], Message::Payload(PayloadItem::Eof)));
    }

    #[test]
    fn pipelined_requests_decode_in_sequence() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(
            "POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nabGET /b HTTP/1.1\r\nHost: x\r\n\r\nGET /c HTTP/1.1\r\nHost: x\r\n\r\n",
        );

        let items = drain(&mut decoder, &mut buf);
        let headers: Vec<_> = items
            .iter()
            .filter_map(|m| match m {
                Message::Header((h, _)) => Some(h.uri().path().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(headers, vec!["/a", "/b", "/c"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_request_round_trip() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(
            "POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );

        let items = drain(&mut decoder, &mut buf);
        let body: Vec<u8> = items
            .iter()
            .filter_map(|m| m.as_payload_bytes())
            .flat_map(|b| b.iter().copied())
            .collect();
        assert_eq!(&body[..], b"Wikipedia");
    }

    #[test]
    fn disconnect_between_messages_is_clean() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from("GET /x HTTP/1.1\r\nHost: x\r\n\r\n");
        let _ = drain(&mut decoder, &mut buf);
        assert!(decoder.on_disconnect(&buf).is_ok());
    }

    #[test]
    fn disconnect_inside_header_reports_partial() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from("GET /x HTTP/1.1\r\nHos");
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        let err = decoder.on_disconnect(&buf).unwrap_err();
        match err {
            HttpError::Parse { source: ParseError::MalformedMessage { partial, .. } } => {
                assert_eq!(&partial[..], b"GET /x HTTP/1.1\r\nHos");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disconnect_mid_fixed_body_is_violation() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from("POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello");
        let _ = drain(&mut decoder, &mut buf);
        assert!(decoder.is_receiving_body());
        assert!(decoder.on_disconnect(&buf).is_err());
    }

    #[test]
    fn method_preserved_through_state_machine() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from("DELETE /item HTTP/1.1\r\nHost: x\r\n\r\n");
        let items = drain(&mut decoder, &mut buf);
        match &items[0] {
            Message::Header((h, kind)) => {
                assert_eq!(h.method(), &Method::DELETE);
                assert_eq!(*kind, BodyKind::Empty);
            }
            _ => panic!("expected header"),
        }
    }
}
