//! Header block parsing and serialization.
//!
//! - [`lines`]: low-level line scanning shared by the chunked trailer and
//!   multipart part-header parsers
//! - [`RequestHeaderDecoder`] / [`ResponseHeaderDecoder`]: head parsing for
//!   the server and client roles, including body classification
//! - [`RequestHeadEncoder`] / [`ResponseHeadEncoder`]: head serialization

pub mod lines;

mod request_header_decoder;
pub use request_header_decoder::RequestHeaderDecoder;

mod response_header_decoder;
pub use response_header_decoder::ResponseHeaderDecoder;

mod header_encoder;
pub use header_encoder::RequestHeadEncoder;
pub use header_encoder::ResponseHeadEncoder;
