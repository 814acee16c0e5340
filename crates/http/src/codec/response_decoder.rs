//! Response decoder (client role).
//!
//! Mirror of the request decoder: one header, then zero or more chunks, then
//! EOF. The caller registers the method of the in-flight request before each
//! exchange so HEAD responses classify correctly, and reads the persistence
//! flag from the header item to decide whether to reuse the connection.

use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::ResponseHeaderDecoder;
use crate::config::HttpOptions;
use crate::protocol::{BodyKind, HttpError, Message, ParseError, PayloadItem, ResponseHeader};

pub struct ResponseDecoder {
    header_decoder: ResponseHeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new(options: &HttpOptions) -> Self {
        Self { header_decoder: ResponseHeaderDecoder::new(options), payload_decoder: None }
    }

    /// Sets the method of the request the next response answers.
    pub fn set_request_method(&mut self, method: Method) {
        self.header_decoder.set_request_method(method);
    }

    pub fn is_receiving_body(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// Classifies a transport disconnect against the decoder state. A close
    /// mid-body of a close-delimited response is the normal end of message.
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

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(&HttpOptions::default())
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHeader, BodyKind, bool)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, body_kind, persistent)) => {
                let payload_decoder = match body_kind {
                    // the byteranges body terminates at its closing
                    // boundary, taken from the content type
                    BodyKind::MultipartByteRanges => match header.multipart_boundary() {
                        Some(boundary) => PayloadDecoder::byteranges(&boundary),
                        None => PayloadDecoder::until_close(),
                    },
                    kind => kind.into(),
                };
                self.payload_decoder = Some(payload_decoder);
                Some(Message::Header((header, body_kind, persistent)))
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
    use http::StatusCode;

    fn drain(decoder: &mut ResponseDecoder, buf: &mut BytesMut) -> Vec<Message<(ResponseHeader, BodyKind, bool)>> {
        let mut items = Vec::new();
        while let Some(item) = decoder.decode(buf).unwrap() {
            items.push(item);
        }
        items
    }

    #[test]
    fn fixed_length_response_round_trip() {
        let mut decoder = ResponseDecoder::default();
        decoder.set_request_method(Method::GET);
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

        let items = drain(&mut decoder, &mut buf);
        assert_eq!(items.len(), 3);
        match &items[0] {
            Message::Header((h, kind, persistent)) => {
                assert_eq!(h.status(), StatusCode::OK);
                assert_eq!(*kind, BodyKind::Length(5));
                assert!(*persistent);
            }
            _ => panic!("expected header"),
        }
        assert_eq!(items[1].as_payload_bytes(), Some(&Bytes::from_static(b"hello")));
    }

    #[test]
    fn until_close_body_completes_on_disconnect() {
        let mut decoder = ResponseDecoder::default();
        decoder.set_request_method(Method::GET);
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nstream");

        let items = drain(&mut decoder, &mut buf);
        assert_eq!(items.last().unwrap().as_payload_bytes(), Some(&Bytes::from_static(b"stream")));

        // the peer closing ends the body normally
        assert!(decoder.on_disconnect(&buf).is_ok());
        let eof = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(eof, Message::Payload(PayloadItem::Eof)));
    }

    #[test]
    fn head_response_skips_body_phase() {
        let mut decoder = ResponseDecoder::default();
        decoder.set_request_method(Method::HEAD);
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n");

        let items = drain(&mut decoder, &mut buf);
        assert!(matches!(items.last().unwrap(), Message::Payload(PayloadItem::Eof)));
        assert!(!decoder.is_receiving_body());
    }

    #[test]
    fn multipart_byteranges_completes_without_disconnect() {
        let mut decoder = ResponseDecoder::default();
        decoder.set_request_method(Method::GET);

        let response = "HTTP/1.1 206 Partial Content\r\n\
                        Content-Type: multipart/byteranges; boundary=SEP\r\n\r\n\
                        --SEP\r\nContent-Range: bytes 0-4/10\r\n\r\nhello\r\n--SEP--\r\n\
                        HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";
        let mut buf = BytesMut::from(response);

        // step one message at a time, the buffer also holds the next response
        match decoder.decode(&mut buf).unwrap().unwrap() {
            Message::Header((_, kind, persistent)) => {
                assert_eq!(kind, BodyKind::MultipartByteRanges);
                assert!(persistent);
            }
            _ => panic!("expected header"),
        }
        let mut body = Vec::new();
        loop {
            match decoder.decode(&mut buf).unwrap().unwrap() {
                Message::Payload(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Message::Payload(PayloadItem::Eof) => break,
                Message::Header(_) => panic!("unexpected header mid-body"),
            }
        }
        assert!(body.ends_with(b"--SEP--"));
        assert!(!decoder.is_receiving_body());

        // the connection stays usable for the next pipelined response
        decoder.set_request_method(Method::GET);
        let items = drain(&mut decoder, &mut buf);
        match &items[0] {
            Message::Header((h, kind, _)) => {
                assert_eq!(h.status(), StatusCode::OK);
                assert_eq!(*kind, BodyKind::Empty);
            }
            _ => panic!("expected second header"),
        }
    }

    #[test]
    fn disconnect_mid_fixed_body_is_violation() {
        let mut decoder = ResponseDecoder::default();
        decoder.set_request_method(Method::GET);
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello");
        let _ = drain(&mut decoder, &mut buf);
        assert!(decoder.on_disconnect(&buf).is_err());
    }
}
