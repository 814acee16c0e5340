//! Streaming codecs for HTTP/1.x messages.
//!
//! Built on the `tokio_util` [`Decoder`]/[`Encoder`] traits:
//!
//! - [`header`]: head parsing and serialization with body classification
//! - [`body`]: payload codecs for the framing styles
//! - [`RequestDecoder`] / [`ResponseDecoder`]: full-message state machines
//!   combining both phases
//!
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`Encoder`]: tokio_util::codec::Encoder

pub mod body;
pub mod header;

mod request_decoder;
pub use request_decoder::RequestDecoder;

mod response_decoder;
pub use response_decoder::ResponseDecoder;

mod request_encoder;
pub use request_encoder::RequestEncoder;

mod response_encoder;
pub use response_encoder::ResponseEncoder;
