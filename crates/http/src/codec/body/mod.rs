//! Body payload codecs.
//!
//! One decoder/encoder pair per framing style, unified behind
//! [`PayloadDecoder`] and [`PayloadEncoder`] which dispatch on the body
//! classification.

mod byteranges_decoder;
pub use byteranges_decoder::ByteRangesDecoder;

mod chunked_decoder;
pub use chunked_decoder::ChunkedDecoder;

mod chunked_encoder;
pub use chunked_encoder::ChunkedEncoder;

mod length_decoder;
pub use length_decoder::LengthDecoder;

mod length_encoder;
pub use length_encoder::LengthEncoder;

mod until_close_decoder;
pub use until_close_decoder::UntilCloseDecoder;

mod payload_decoder;
pub use payload_decoder::PayloadDecoder;

mod payload_encoder;
pub use payload_encoder::PayloadEncoder;
