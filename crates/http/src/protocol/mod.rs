//! Core HTTP protocol abstractions.
//!
//! This module holds the building blocks the codecs and connections are made
//! of: the message/header model, body-type classification, the streaming
//! body source/sink family and the error taxonomy.

mod message;
pub use message::classify_request_body;
pub use message::classify_response_body;
pub use message::BodyKind;
pub use message::Message;
pub use message::PayloadItem;

mod header;
pub use header::MessageHeader;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHeader;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::ProtocolViolation;
pub use error::SendError;
pub use error::SourceError;

pub mod body;

use bytes::BytesMut;

/// Either side's message head, for code that frames outgoing messages
/// without caring about the role.
#[derive(Debug, Clone)]
pub enum MessageHead {
    Request(RequestHeader),
    Response(ResponseHeader),
}

impl MessageHead {
    pub fn header(&self) -> &MessageHeader {
        match self {
            MessageHead::Request(head) => head.header(),
            MessageHead::Response(head) => head.header(),
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        match self {
            MessageHead::Request(head) => head.header_mut(),
            MessageHead::Response(head) => head.header_mut(),
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            MessageHead::Request(head) => head.encode(dst),
            MessageHead::Response(head) => head.encode(dst),
        }
    }
}

impl From<RequestHeader> for MessageHead {
    fn from(head: RequestHeader) -> Self {
        MessageHead::Request(head)
    }
}

impl From<ResponseHeader> for MessageHead {
    fn from(head: ResponseHeader) -> Self {
        MessageHead::Response(head)
    }
}
