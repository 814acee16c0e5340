//! Encoder for the HTTP chunked transfer coding.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::protocol::{PayloadItem, SendError};

/// Encodes payload items as chunked frames.
///
/// Each chunk is framed as `<hex-size>\r\n<data>\r\n`; EOF emits the
/// terminal `0\r\n\r\n` frame. Empty chunks are skipped so a caller cannot
/// accidentally terminate the body early.
pub struct ChunkedEncoder {
    finished: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { finished: false }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<PayloadItem> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.finished {
            return Err(SendError::Closed);
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                if bytes.is_empty() {
                    return Ok(());
                }
                write_chunk(&bytes, dst)?;
                trace!(len = bytes.len(), "encoded chunk");
                Ok(())
            }
            PayloadItem::Eof => {
                dst.extend_from_slice(b"0\r\n\r\n");
                self.finished = true;
                trace!("encoded last chunk");
                Ok(())
            }
        }
    }
}

fn write_chunk(bytes: &Bytes, dst: &mut BytesMut) -> Result<(), SendError> {
    // hex size line plus two CRLF pairs
    dst.reserve(bytes.len() + 20);
    let mut writer = dst.writer();
    write!(writer, "{:X}\r\n", bytes.len()).map_err(SendError::io)?;
    let dst = writer.get_mut();
    dst.extend_from_slice(bytes);
    dst.extend_from_slice(b"\r\n");
    Ok(())
}
