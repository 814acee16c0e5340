//! Request header decoder (server role).
//!
//! Parses a raw header block into a [`RequestHeader`] and classifies the body
//! type. Built on `httparse` for the request line; the resulting header
//! fields are routed through [`MessageHeader`] so the fast-path invariants
//! hold from the start.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{Method, Uri, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::lines;
use crate::config::HttpOptions;
use crate::protocol::{classify_request_body, BodyKind, MessageHeader, ParseError, RequestHeader};
use crate::utils::ensure;

/// Upper bound of the header array handed to httparse.
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
///
/// Yields the parsed header together with its body classification; the caller
/// installs the matching payload decoder.
pub struct RequestHeaderDecoder {
    max_header_num: usize,
    max_header_bytes: usize,
}

impl RequestHeaderDecoder {
    pub fn new(options: &HttpOptions) -> Self {
        Self {
            max_header_num: options.max_header_num.min(MAX_HEADER_NUM),
            max_header_bytes: options.max_header_bytes,
        }
    }
}

impl Default for RequestHeaderDecoder {
    fn default() -> Self {
        Self::new(&HttpOptions::default())
    }
}

impl Decoder for RequestHeaderDecoder {
    type Item = (RequestHeader, BodyKind);
    type Error = ParseError;

    /// Attempts to decode a request head from the buffer.
    ///
    /// Returns `Ok(None)` without consuming anything when the buffer does
    /// not yet hold a complete header block, so the call is re-entrant on
    /// the same (grown) buffer.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // minimum viable request line: "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let Some(block_end) = lines::find_header_block_end(src) else {
            ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
            return Ok(None);
        };
        ensure!(block_end <= self.max_header_bytes, ParseError::too_large_header(block_end, self.max_header_bytes));

        // httparse rejects obs-fold, splice continuations first when present
        let unfolded = lines::unfold_header_block(&src[..block_end]);

        let mut req = httparse::Request::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

        let parse_input: &[u8] = match &unfolded {
            Some(block) => block,
            None => &src[..block_end],
        };
        let parsed_result = req.parse_with_uninit_headers(parse_input, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(self.max_header_num),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed request head");
                ensure!(req.headers.len() <= self.max_header_num, ParseError::too_many_headers(self.max_header_num));

                let method: Method = req.method.ok_or(ParseError::InvalidMethod)?.parse().map_err(|_| ParseError::InvalidMethod)?;
                let uri: Uri = req.path.ok_or(ParseError::InvalidUri)?.parse().map_err(|_| ParseError::InvalidUri)?;
                let version = match req.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let mut header = MessageHeader::new();
                for parsed in req.headers.iter() {
                    let value = std::str::from_utf8(parsed.value)
                        .map_err(|_| ParseError::invalid_header(format!("non utf-8 value for {}", parsed.name)))?;
                    header.add_header(parsed.name, value)?;
                }

                let mut head = RequestHeader::new(method, uri);
                head.set_version(version);
                *head.header_mut() = header;

                // consume the head bytes only after a fully successful parse
                let _ = src.split_to(block_end);

                let body_kind = classify_request_body(&head)?;
                Ok(Some((head, body_kind)))
            }
            // the buffer holds a terminated block, a partial parse of it is
            // a malformed head
            Status::Partial => Err(ParseError::invalid_header("truncated request head")),
        }
    }
}
