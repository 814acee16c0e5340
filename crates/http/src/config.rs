//! Engine configuration.
//!
//! All tunables live in a single [`HttpOptions`] struct that is built once at
//! startup and threaded through constructors. Nothing is read from the
//! environment at runtime.

use std::time::Duration;

/// Configuration for the HTTP message engine.
///
/// The defaults match common interoperability limits; construct with
/// `HttpOptions::default()` and override fields as needed.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Maximum number of header fields accepted in one message.
    pub max_header_num: usize,
    /// Maximum size in bytes of one header block.
    pub max_header_bytes: usize,
    /// Body size above which the compressing sink switches to gzip.
    pub compress_threshold: usize,
    /// Transparently decompress gzip-encoded inbound bodies.
    pub auto_decompress: bool,
    /// Receive timeout, measured from the last byte received. `None` disables
    /// the timeout.
    pub receive_timeout: Option<Duration>,
    /// Cache size budget in bytes.
    pub cache_capacity: usize,
    /// Whether the cache acts as a shared cache (affects `Authorization` and
    /// `Cache-Control: private` handling).
    pub shared_cache: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_header_num: 64,
            max_header_bytes: 8 * 1024,
            compress_threshold: 4 * 1024,
            auto_decompress: true,
            receive_timeout: Some(Duration::from_secs(60)),
            cache_capacity: 8 * 1024 * 1024,
            shared_cache: true,
        }
    }
}
