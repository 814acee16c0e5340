//! Connection loops for the server and client roles.
//!
//! [`HttpConnection`] drives a server-side connection: it decodes pipelined
//! requests, feeds their bodies to a [`Handler`] through a [`BodySource`]
//! and streams responses back. [`ClientConnection`] sends requests and
//! decodes responses on the client side.
//!
//! [`Handler`]: crate::handler::Handler
//! [`BodySource`]: crate::protocol::body::BodySource

mod timing;

mod http_connection;
pub use http_connection::HttpConnection;

mod client_connection;
pub use client_connection::ClientConnection;

/// Receive-side phase of a connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for or accumulating a header block.
    ReceivingHeader,
    /// A header was parsed; body bytes are being received.
    ReceivingBody,
}

/// Per-connection traffic counters.
#[derive(Debug, Copy, Clone, Default)]
pub struct ConnCounters {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub body_bytes_received: u64,
}
