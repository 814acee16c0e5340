//! Head encoders for outgoing messages.
//!
//! Before serializing, the framing headers are reconciled with the body
//! classification: a fixed-length body forces Content-Length, a chunked body
//! forces `Transfer-Encoding: chunked`, an empty body forces
//! `Content-Length: 0`.

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::protocol::{BodyKind, MessageHeader, RequestHeader, ResponseHeader, SendError};

/// Initial buffer size reserved for head serialization.
const INIT_HEADER_SIZE: usize = 4 * 1024;

pub struct ResponseHeadEncoder;

impl Encoder<(ResponseHeader, BodyKind)> for ResponseHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHeader, BodyKind), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, body_kind) = item;
        dst.reserve(INIT_HEADER_SIZE);
        reconcile_framing(head.header_mut(), body_kind)?;
        head.encode(dst);
        trace!(status = %head.status(), "encoded response head");
        Ok(())
    }
}

pub struct RequestHeadEncoder;

impl Encoder<(RequestHeader, BodyKind)> for RequestHeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHeader, BodyKind), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, body_kind) = item;
        dst.reserve(INIT_HEADER_SIZE);
        reconcile_framing(head.header_mut(), body_kind)?;
        head.encode(dst);
        trace!(method = %head.method(), uri = %head.uri(), "encoded request head");
        Ok(())
    }
}

fn reconcile_framing(header: &mut MessageHeader, body_kind: BodyKind) -> Result<(), SendError> {
    match body_kind {
        BodyKind::Length(n) => {
            header.remove_header("Transfer-Encoding");
            header.set_content_length(n);
        }
        BodyKind::Chunked => {
            header.remove_header("Content-Length");
            header.set_header("Transfer-Encoding", "chunked").map_err(|e| SendError::invalid_body(e))?;
        }
        BodyKind::Empty => {
            header.remove_header("Transfer-Encoding");
            header.set_content_length(0);
        }
        // until-close and multipart bodies keep whatever framing the caller
        // prepared; websocket handshakes carry no framing headers
        BodyKind::UntilClose | BodyKind::MultipartByteRanges | BodyKind::Websocket => {}
    }
    Ok(())
}
