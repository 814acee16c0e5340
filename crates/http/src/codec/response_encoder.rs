//! Response encoder (server role).
//!
//! Combines the head encoder and the payload encoder behind a single
//! [`Encoder`] over [`Message`] items, mirroring the decoder state machine.

use std::io;
use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::ResponseHeadEncoder;
use crate::protocol::{BodyKind, Message, ResponseHeader, SendError};

pub struct ResponseEncoder {
    head_encoder: ResponseHeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { head_encoder: ResponseHeadEncoder, payload_encoder: None }
    }
}

impl Encoder<Message<(ResponseHeader, BodyKind)>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHeader, BodyKind)>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, body_kind)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(body_kind.into());
                self.head_encoder.encode((head, body_kind), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finished() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}
