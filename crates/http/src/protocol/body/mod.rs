//! Streaming body abstractions.
//!
//! - [`BodySource`]: non-blocking inbound accumulator with completion and
//!   destroy semantics
//! - [`BodySink`] implementations: fixed-length and chunked frame sinks,
//!   plus the gzip and multipart wrappers
//! - [`FormUrlEncodedBody`]: form body builder for the client side

pub mod source;
pub use source::{BodySource, SourceState};

pub mod sink;
pub use sink::{BodySink, ChunkedSink, FixedLengthSink, SinkState};

pub mod gzip;
pub use gzip::{GzipBodySource, GzipSink};

pub mod multipart;
pub use multipart::{MultipartDecoder, MultipartItem, MultipartSink, PartId};

mod form;
pub use form::FormUrlEncodedBody;

use crate::protocol::BodyKind;

/// Builds the inbound body source matching a classification: messages that
/// statically carry no body get an absent source, everything else starts
/// receiving.
pub fn source_for(kind: BodyKind) -> BodySource {
    match kind {
        BodyKind::Empty | BodyKind::Websocket => BodySource::absent(),
        _ => BodySource::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_matches_classification() {
        assert_eq!(source_for(BodyKind::Empty).available(), None);
        assert_eq!(source_for(BodyKind::Websocket).available(), None);
        assert_eq!(source_for(BodyKind::Length(5)).available(), Some(0));
        assert_eq!(source_for(BodyKind::Chunked).available(), Some(0));
    }
}
