//! Response header decoder (client role).
//!
//! Parses a status line and header block into a [`ResponseHeader`] and
//! classifies the body type. Classification needs the request context (a
//! HEAD response never has a body), so the decoder is told the method of the
//! in-flight request before each exchange.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{Method, StatusCode, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::lines;
use crate::codec::header::request_header_decoder::MAX_HEADER_NUM;
use crate::config::HttpOptions;
use crate::protocol::{classify_response_body, BodyKind, MessageHeader, ParseError, ResponseHeader};
use crate::utils::ensure;

/// Decoder for HTTP response heads.
///
/// Yields the parsed header, the body classification and whether the
/// connection stays persistent after this response.
pub struct ResponseHeaderDecoder {
    max_header_num: usize,
    max_header_bytes: usize,
    request_method: Method,
}

impl ResponseHeaderDecoder {
    pub fn new(options: &HttpOptions) -> Self {
        Self {
            max_header_num: options.max_header_num.min(MAX_HEADER_NUM),
            max_header_bytes: options.max_header_bytes,
            request_method: Method::GET,
        }
    }

    /// Sets the method of the request the next response answers.
    pub fn set_request_method(&mut self, method: Method) {
        self.request_method = method;
    }
}

impl Default for ResponseHeaderDecoder {
    fn default() -> Self {
        Self::new(&HttpOptions::default())
    }
}

impl Decoder for ResponseHeaderDecoder {
    type Item = (ResponseHeader, BodyKind, bool);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // minimum viable status line: "HTTP/1.1 200 \r\n\r\n"
        if src.len() < 16 {
            return Ok(None);
        }

        let Some(block_end) = lines::find_header_block_end(src) else {
            ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
            return Ok(None);
        };
        ensure!(block_end <= self.max_header_bytes, ParseError::too_large_header(block_end, self.max_header_bytes));

        // httparse rejects obs-fold, splice continuations first when present
        let unfolded = lines::unfold_header_block(&src[..block_end]);

        let mut resp = httparse::Response::new(&mut []);
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] =
            [const { MaybeUninit::uninit() }; MAX_HEADER_NUM];

        let parse_input: &[u8] = match &unfolded {
            Some(block) => block,
            None => &src[..block_end],
        };
        let parsed_result = httparse::ParserConfig::default()
            .parse_response_with_uninit_headers(&mut resp, parse_input, &mut headers)
            .map_err(|e| match e {
                Error::TooManyHeaders => ParseError::too_many_headers(self.max_header_num),
                e => ParseError::invalid_header(e.to_string()),
            });

        match parsed_result? {
            Status::Complete(head_size) => {
                trace!(head_size, "parsed response head");
                ensure!(resp.headers.len() <= self.max_header_num, ParseError::too_many_headers(self.max_header_num));

                let status =
                    StatusCode::from_u16(resp.code.ok_or(ParseError::InvalidStatus)?).map_err(|_| ParseError::InvalidStatus)?;
                let version = match resp.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let mut header = MessageHeader::new();
                for parsed in resp.headers.iter() {
                    let value = std::str::from_utf8(parsed.value)
                        .map_err(|_| ParseError::invalid_header(format!("non utf-8 value for {}", parsed.name)))?;
                    header.add_header(parsed.name, value)?;
                }

                let mut head = match resp.reason {
                    Some(reason) if Some(reason) != status.canonical_reason() => {
                        ResponseHeader::with_reason(status, reason)
                    }
                    _ => ResponseHeader::new(status),
                };
                head.set_version(version);
                *head.header_mut() = header;

                let _ = src.split_to(block_end);

                let (body_kind, persistent) = classify_response_body(&head, &self.request_method);
                Ok(Some((head, body_kind, persistent)))
            }
            // the buffer holds a terminated block, a partial parse of it is
            // a malformed head
            Status::Partial => Err(ParseError::invalid_header("truncated response head")),
        }
    }
}
