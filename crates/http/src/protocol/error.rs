use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("send error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("{source}")]
    Protocol {
        #[from]
        source: ProtocolViolation,
    },

    #[error("receive timeout, no byte for {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("transport failure: {source}")]
    Transport { source: io::Error },
}

impl HttpError {
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn transport(source: io::Error) -> Self {
        Self::Transport { source }
    }

    /// Returns true if this error is the distinct timeout kind, letting
    /// callers tell "peer too slow" apart from "peer sent garbage".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Unrecoverable parse failures. These are always fatal to the current
/// message; the connection is typically closed afterwards.
///
/// "Need more data" is never an error: decoders express it by returning
/// `Ok(None)` without consuming buffer positions.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid status line")]
    InvalidStatus,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("malformed message: {reason} ({} partial bytes buffered)", partial.len())]
    MalformedMessage { reason: String, partial: Bytes },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    /// A malformed message, carrying the partial bytes already buffered for
    /// diagnostics (e.g. a disconnect in the middle of a header block).
    pub fn malformed<S: ToString>(reason: S, partial: Bytes) -> Self {
        Self::MalformedMessage { reason: reason.to_string(), partial }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// A framing violation detected mid-message, reported with the parser state
/// name and the number of body bytes received so far.
#[derive(Debug, Error)]
#[error("protocol violation in state `{state}` after {received} body bytes: {reason}")]
pub struct ProtocolViolation {
    pub state: &'static str,
    pub received: u64,
    pub reason: String,
}

impl ProtocolViolation {
    pub fn new<S: ToString>(state: &'static str, received: u64, reason: S) -> Self {
        Self { state, received, reason: reason.to_string() }
    }
}

/// Failures on the outbound (sink) side.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("body overflow: declared {declared} bytes, attempted to write {attempted}")]
    Overflow { declared: u64, attempted: u64 },

    #[error("sink closed early: declared {declared} bytes, only {written} written")]
    ClosedEarly { declared: u64, written: u64 },

    #[error("sink already closed")]
    Closed,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Failures observed by a consumer reading from a body source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("underflow: requested {requested} bytes, {available} available")]
    Underflow { requested: usize, available: usize },

    #[error("body source destroyed: {reason}")]
    Destroyed { reason: String },

    #[error("append on terminal body source")]
    TerminalState,
}
