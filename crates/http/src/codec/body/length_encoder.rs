//! Encoder for fixed-length bodies.

use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::protocol::{PayloadItem, SendError};

/// Writes body bytes against a declared Content-Length.
///
/// Writing more than declared fails with [`SendError::Overflow`]; closing
/// before the declared length is reached fails with
/// [`SendError::ClosedEarly`].
pub struct LengthEncoder {
    declared: u64,
    remaining: u64,
}

impl LengthEncoder {
    pub fn new(declared: u64) -> Self {
        Self { declared, remaining: declared }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn written(&self) -> u64 {
        self.declared - self.remaining
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let len = bytes.len() as u64;
                if len > self.remaining {
                    return Err(SendError::Overflow {
                        declared: self.declared,
                        attempted: self.written() + len,
                    });
                }
                self.remaining -= len;
                dst.extend_from_slice(&bytes);
                trace!(len, remaining = self.remaining, "encoded fixed-length bytes");
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    return Err(SendError::ClosedEarly { declared: self.declared, written: self.written() });
                }
                trace!(declared = self.declared, "finished fixed-length body");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn writes_up_to_declared_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Eof, &mut dst).unwrap();
        assert_eq!(&dst[..], b"hello");
        assert!(encoder.is_finished());
    }

    #[test]
    fn overflow_rejected() {
        let mut encoder = LengthEncoder::new(3);
        let mut dst = BytesMut::new();
        let err = encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap_err();
        assert!(matches!(err, SendError::Overflow { declared: 3, attempted: 5 }));
        // nothing written on failure
        assert!(dst.is_empty());
    }

    #[test]
    fn early_close_rejected() {
        let mut encoder = LengthEncoder::new(10);
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
        let err = encoder.encode(PayloadItem::Eof, &mut dst).unwrap_err();
        assert!(matches!(err, SendError::ClosedEarly { declared: 10, written: 5 }));
    }
}
