//! Core message types shared by the client and server state machines.
//!
//! A [`Message`] is either a parsed header or a payload item; the decoders
//! produce them in order: one header, then zero or more chunks, then EOF.
//! [`BodyKind`] is the result of body-type classification, the tag that
//! selects the concrete body decoder or encoder variant.

use bytes::{Buf, Bytes};
use http::{Method, StatusCode, Version};

use crate::protocol::{ParseError, RequestHeader, ResponseHeader};

/// Represents an HTTP message item: either a header or a payload item.
///
/// The generic parameter `T` is the header type (request or response header),
/// `Data` the payload chunk type (defaults to `Bytes`).
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// An item in the payload stream: a chunk of body data, or the EOF marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// Body-type classification of a message.
///
/// Determined once from the header block; selects the concrete body decoder
/// (inbound) or encoder (outbound).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// No body.
    Empty,
    /// Fixed-length body with a known Content-Length.
    Length(u64),
    /// Chunked transfer-coding.
    Chunked,
    /// Body delimited by connection close (HTTP/0.9 simple body, or
    /// `Connection: close` without a declared length).
    UntilClose,
    /// `multipart/byteranges` body of a 206 response.
    MultipartByteRanges,
    /// WebSocket handshake; the body bytes belong to the upgraded protocol.
    Websocket,
}

impl BodyKind {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, BodyKind::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BodyKind::Empty)
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, BodyKind::UntilClose)
    }
}

/// Classifies the body of an inbound request (server role).
///
/// Rules:
/// - GET carrying a WebSocket handshake key is a websocket body
/// - bodyless methods have an empty body
/// - Content-Length selects a fixed-length body (0 means empty)
/// - `Transfer-Encoding: chunked` selects a chunked body
/// - a body-bearing method without either header is malformed
pub fn classify_request_body(header: &RequestHeader) -> Result<BodyKind, ParseError> {
    if header.method() == Method::GET && header.is_websocket_handshake() {
        return Ok(BodyKind::Websocket);
    }

    if !header.need_body() {
        return Ok(BodyKind::Empty);
    }

    if header.header().is_chunked() {
        return Ok(BodyKind::Chunked);
    }

    match header.header().content_length() {
        Some(0) => Ok(BodyKind::Empty),
        Some(n) => Ok(BodyKind::Length(n)),
        None => Err(ParseError::invalid_content_length(format!(
            "method {} requires content-length or chunked transfer-encoding",
            header.method()
        ))),
    }
}

/// Classifies the body of an inbound response (client role).
///
/// `request_method` is the method of the request this response answers; a
/// HEAD response never carries a body regardless of its headers.
///
/// Returns the body kind together with whether the connection stays
/// persistent after this message.
pub fn classify_response_body(header: &ResponseHeader, request_method: &Method) -> (BodyKind, bool) {
    let persistent = header.is_persistent();

    if header.status() == StatusCode::SWITCHING_PROTOCOLS && header.is_websocket_upgrade() {
        return (BodyKind::Websocket, false);
    }

    if header.is_bodyless_status() || request_method == Method::HEAD {
        return (BodyKind::Empty, persistent);
    }

    if header.header().is_chunked() {
        return (BodyKind::Chunked, persistent);
    }

    // a declared length delimits the message even for multipart content
    if let Some(length) = header.header().content_length() {
        let kind = if length == 0 { BodyKind::Empty } else { BodyKind::Length(length) };
        return (kind, persistent);
    }

    if header.status() == StatusCode::PARTIAL_CONTENT && header.is_multipart_byteranges() {
        return (BodyKind::MultipartByteRanges, persistent);
    }

    // no explicit length from here on
    if header.version() != Version::HTTP_09 && header.status().as_u16() >= 300 {
        return (BodyKind::Empty, false);
    }

    if header.is_connection_close() {
        return (BodyKind::UntilClose, false);
    }

    // assume an HTTP/0.9 style simple body, delimited by close
    (BodyKind::UntilClose, false)
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }

    /// The chunk bytes if this item is a body chunk.
    pub fn as_payload_bytes(&self) -> Option<&Bytes> {
        match self {
            Message::Payload(PayloadItem::Chunk(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
