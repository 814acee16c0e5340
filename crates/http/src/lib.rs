//! An asynchronous HTTP/1.x message engine
//!
//! This crate provides the building blocks of an HTTP/1.1 client and server:
//! incremental header and body parsing, streaming body sources and sinks,
//! protocol state machines for both connection roles, a validating response
//! cache, and server-sent event support. It is built on top of tokio and
//! focuses on a clean API with careful memory management.
//!
//! # Features
//!
//! - Full HTTP/1.1 message parsing and serialization
//! - Asynchronous I/O using tokio codecs
//! - Streaming request and response bodies
//! - Chunked transfer encoding with extensions and trailers
//! - Fixed-length, close-delimited and multipart byte-range bodies
//! - Transparent gzip compression and decompression
//! - Keep-alive connections and pipelining
//! - Expect-continue mechanism
//! - Response caching with freshness and revalidation
//! - Server-sent event streams
//!
//!
//! # Example
//!
//! ```no_run
//! use http::{Request, Response};
//! use std::error::Error;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use lightweb_http::config::HttpOptions;
//! use lightweb_http::connection::HttpConnection;
//! use lightweb_http::handler::make_handler;
//! use lightweb_http::protocol::body::BodySource;
//!
//! #[tokio::main]
//! async fn main() {
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let options = HttpOptions::default();
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         let options = options.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer, &options);
//!             match connection.process(handler).await {
//!                 Ok(_) => info!("connection shutdown"),
//!                 Err(e) => error!(cause = %e, "connection ended with error"),
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(
//!     request: Request<BodySource>,
//! ) -> Result<Response<String>, Box<dyn Error + Send + Sync>> {
//!     let path = request.uri().path().to_string();
//!     Ok(Response::new(format!("hello from {path}\r\n")))
//! }
//! ```
//!
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`codec`]: Incremental decoders and encoders for headers and bodies
//! - [`protocol`]: Message model, body classification and streaming bodies
//! - [`connection`]: Server and client connection state machines
//! - [`handler`]: Request handler traits and utilities
//! - [`cache`]: Response cache with freshness and revalidation
//! - [`sse`]: Server-sent event serialization and parsing
//!
//! # Core Components
//!
//! ## Message Parsing
//!
//! Headers and bodies are decoded incrementally: every decoder accepts input
//! split at arbitrary byte boundaries and returns `Ok(None)` until a complete
//! item is available. Body framing is chosen by
//! [`protocol::classify_request_body`] and [`protocol::classify_response_body`]
//! from the message head.
//!
//! ## Body Streaming
//!
//! Received body content flows through [`protocol::body::BodySource`], a
//! shared handle supporting incremental reads, suspension and asynchronous
//! completion notification. Outgoing bodies are written through
//! [`protocol::body::BodySink`] implementations covering fixed-length,
//! chunked, multipart and gzip framing.
//!
//! ## Connection Handling
//!
//! [`connection::HttpConnection`] drives the server side of a connection:
//! request parsing, expect-continue, handler dispatch, response serialization
//! and keep-alive. [`connection::ClientConnection`] drives the client side.
//!
//! ## Caching
//!
//! [`cache::HttpCache`] stores shareable responses and answers lookups with
//! a hit, a conditional revalidation request or a miss, tracking hit
//! statistics over a sliding window.
//!
//! ## Error Handling
//!
//! The crate uses custom error types that implement `std::error::Error`:
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Message parsing errors
//! - [`protocol::SendError`]: Message sending errors
//! - [`protocol::SourceError`]: Streaming body read errors
//!
//! # Limitations
//!
//! - HTTP/1.x only (no HTTP/2 or HTTP/3)
//! - No TLS support (use a reverse proxy for HTTPS)
//! - Header limits are configurable through [`config::HttpOptions`]

pub mod cache;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod sse;

mod utils;
