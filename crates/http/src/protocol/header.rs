//! HTTP message header model.
//!
//! [`MessageHeader`] stores header fields with cached fast paths for the
//! high-frequency headers (Content-Length, Content-Type, Transfer-Encoding,
//! Date, Server) and a generic ordered map for everything else. The accessor
//! layer is uniform: callers never need to know which storage a header lives
//! in.
//!
//! Invariant: a header cached in a fast-path field never also appears in the
//! generic map.

use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use mime::Mime;
use tracing::trace;

use crate::protocol::ParseError;

/// Ordered header field collection with case-insensitive name lookup.
#[derive(Debug, Clone, Default)]
pub struct MessageHeader {
    fields: HeaderMap,
    content_length: Option<u64>,
    content_type: Option<HeaderValue>,
    transfer_encoding: Option<HeaderValue>,
    date: Option<HeaderValue>,
    server: Option<HeaderValue>,
}

/// Fast-path discriminator, resolved once per accessor call.
enum FastField {
    ContentLength,
    ContentType,
    TransferEncoding,
    Date,
    Server,
}

impl FastField {
    fn resolve(name: &str) -> Option<FastField> {
        if name.eq_ignore_ascii_case("content-length") {
            Some(FastField::ContentLength)
        } else if name.eq_ignore_ascii_case("content-type") {
            Some(FastField::ContentType)
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            Some(FastField::TransferEncoding)
        } else if name.eq_ignore_ascii_case("date") {
            Some(FastField::Date)
        } else if name.eq_ignore_ascii_case("server") {
            Some(FastField::Server)
        } else {
            None
        }
    }
}

impl MessageHeader {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets a header with overwrite semantics.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        match FastField::resolve(name) {
            Some(FastField::ContentLength) => {
                let length = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ParseError::invalid_content_length(format!("value {value} is not u64")))?;
                self.content_length = Some(length);
            }
            Some(FastField::ContentType) => self.content_type = Some(parse_value(name, value)?),
            Some(FastField::TransferEncoding) => self.transfer_encoding = Some(parse_value(name, value)?),
            Some(FastField::Date) => self.date = Some(parse_value(name, value)?),
            Some(FastField::Server) => self.server = Some(parse_value(name, value)?),
            None => {
                let header_name = parse_name(name)?;
                let header_value = parse_value(name, value)?;
                self.fields.insert(header_name, header_value);
            }
        }
        Ok(())
    }

    /// Adds a header with multi-valued accumulation semantics. The fast-path
    /// headers are single-valued, so adding one behaves like `set_header`.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        if FastField::resolve(name).is_some() {
            return self.set_header(name, value);
        }
        let header_name = parse_name(name)?;
        let header_value = parse_value(name, value)?;
        self.fields.append(header_name, header_value);
        Ok(())
    }

    /// Removes a header. Removing a fast-path header resets its cached value
    /// to "unknown". Returns whether the header was present.
    pub fn remove_header(&mut self, name: &str) -> bool {
        match FastField::resolve(name) {
            Some(FastField::ContentLength) => self.content_length.take().is_some(),
            Some(FastField::ContentType) => self.content_type.take().is_some(),
            Some(FastField::TransferEncoding) => self.transfer_encoding.take().is_some(),
            Some(FastField::Date) => self.date.take().is_some(),
            Some(FastField::Server) => self.server.take().is_some(),
            None => match HeaderName::from_str(name) {
                Ok(header_name) => self.fields.remove(header_name).is_some(),
                Err(_) => false,
            },
        }
    }

    /// Returns the first value of a header, regardless of which storage it
    /// lives in.
    pub fn get_header(&self, name: &str) -> Option<String> {
        match FastField::resolve(name) {
            Some(FastField::ContentLength) => self.content_length.map(|n| n.to_string()),
            Some(FastField::ContentType) => value_to_string(self.content_type.as_ref()),
            Some(FastField::TransferEncoding) => value_to_string(self.transfer_encoding.as_ref()),
            Some(FastField::Date) => value_to_string(self.date.as_ref()),
            Some(FastField::Server) => value_to_string(self.server.as_ref()),
            None => {
                let value = self.fields.get(HeaderName::from_str(name).ok()?)?;
                value.to_str().ok().map(str::to_string)
            }
        }
    }

    /// Returns every value of a header in insertion order.
    pub fn get_header_all(&self, name: &str) -> Vec<String> {
        if FastField::resolve(name).is_some() {
            return self.get_header(name).into_iter().collect();
        }
        let Ok(header_name) = HeaderName::from_str(name) else {
            return Vec::new();
        };
        self.fields.get_all(header_name).iter().filter_map(|v| v.to_str().ok().map(str::to_string)).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_header(name).is_some() || !self.get_header_all(name).is_empty()
    }

    /// Number of header entries, cached fast-path fields included.
    pub fn len(&self) -> usize {
        let fast = [
            self.content_length.is_some(),
            self.content_type.is_some(),
            self.transfer_encoding.is_some(),
            self.date.is_some(),
            self.server.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        fast + self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The generic (non fast-path) fields.
    pub fn fields(&self) -> &HeaderMap {
        &self.fields
    }

    /// Cached Content-Length; `None` means unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn set_content_length(&mut self, length: u64) {
        self.content_length = Some(length);
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    pub fn transfer_encoding(&self) -> Option<&HeaderValue> {
        self.transfer_encoding.as_ref()
    }

    pub fn date(&self) -> Option<&HeaderValue> {
        self.date.as_ref()
    }

    pub fn server(&self) -> Option<&HeaderValue> {
        self.server.as_ref()
    }

    /// Whether the Transfer-Encoding names chunked as its final coding.
    pub fn is_chunked(&self) -> bool {
        const CHUNKED: &[u8] = b"chunked";
        if let Some(value) = &self.transfer_encoding {
            if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
                return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
            }
        }
        false
    }

    /// Parses the Accept header into media ranges ordered by descending
    /// quality factor. Ties prefer the more specific range: `type/subtype`
    /// before `type/*`, and `*/*` last.
    pub fn accept(&self) -> Vec<Mime> {
        let Some(value) = self.fields.get(header::ACCEPT) else {
            return Vec::new();
        };
        let Ok(value) = value.to_str() else {
            return Vec::new();
        };

        let mut ranges: Vec<(Mime, i64, u8)> = value
            .split(',')
            .filter_map(|part| Mime::from_str(part.trim()).ok())
            .map(|mime| {
                let quality = mime
                    .get_param("q")
                    .and_then(|q| q.as_str().parse::<f32>().ok())
                    .unwrap_or(1.0);
                // scale to thousandths so the sort key stays total
                let quality = (quality * 1000.0) as i64;
                let specificity = if mime.type_() == mime::STAR {
                    0
                } else if mime.subtype() == mime::STAR {
                    1
                } else {
                    2
                };
                (mime, quality, specificity)
            })
            .collect();

        ranges.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)));
        ranges.into_iter().map(|(mime, _, _)| mime).collect()
    }

    /// Strips hop-by-hop headers: everything listed in Connection, the
    /// standard hop-by-hop set, and any Transfer-Encoding that is not exactly
    /// `chunked`.
    pub fn remove_hop_by_hop_headers(&mut self) {
        for listed in self.get_header_all("Connection") {
            for name in listed.split(',') {
                self.remove_header(name.trim());
            }
        }

        self.remove_header("Connection");
        self.remove_header("Proxy-Connection");
        self.remove_header("Keep-Alive");
        self.remove_header("Proxy-Authenticate");
        self.remove_header("Proxy-Authorization");
        self.remove_header("TE");
        self.remove_header("Trailers");
        self.remove_header("Upgrade");

        if let Some(te) = &self.transfer_encoding {
            if !te.as_bytes().trim_ascii().eq_ignore_ascii_case(b"chunked") {
                trace!("dropping non-chunked transfer-encoding while stripping hop-by-hop headers");
                self.transfer_encoding = None;
            }
        }
    }

    /// Materializes a complete `HeaderMap` with the fast-path fields folded
    /// back in, for interop with `http::Request`/`http::Response` surfaces.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = self.fields.clone();
        if let Some(length) = self.content_length {
            if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
                map.insert(header::CONTENT_LENGTH, value);
            }
        }
        if let Some(value) = &self.content_type {
            map.insert(header::CONTENT_TYPE, value.clone());
        }
        if let Some(value) = &self.transfer_encoding {
            map.insert(header::TRANSFER_ENCODING, value.clone());
        }
        if let Some(value) = &self.date {
            map.insert(header::DATE, value.clone());
        }
        if let Some(value) = &self.server {
            map.insert(header::SERVER, value.clone());
        }
        map
    }

    /// Serializes the header fields (without the start line and without the
    /// terminating empty line). Fast-path fields are written first.
    pub fn encode(&self, dst: &mut BytesMut) {
        if let Some(length) = self.content_length {
            dst.put_slice(b"Content-Length: ");
            dst.put_slice(length.to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        put_fast_field(dst, b"Content-Type", self.content_type.as_ref());
        put_fast_field(dst, b"Transfer-Encoding", self.transfer_encoding.as_ref());
        put_fast_field(dst, b"Date", self.date.as_ref());
        put_fast_field(dst, b"Server", self.server.as_ref());

        for (name, value) in self.fields.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
    }
}

fn put_fast_field(dst: &mut BytesMut, name: &[u8], value: Option<&HeaderValue>) {
    if let Some(value) = value {
        dst.put_slice(name);
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
}

fn parse_name(name: &str) -> Result<HeaderName, ParseError> {
    HeaderName::from_str(name).map_err(|_| ParseError::invalid_header(format!("invalid header name: {name}")))
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue, ParseError> {
    HeaderValue::from_str(value).map_err(|_| ParseError::invalid_header(format!("invalid value for header {name}")))
}

fn value_to_string(value: Option<&HeaderValue>) -> Option<String> {
    value.and_then(|v| v.to_str().ok()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_fast_path() {
        let mut header = MessageHeader::new();
        header.set_header("Content-Length", "42").unwrap();

        assert_eq!(header.content_length(), Some(42));
        assert_eq!(header.get_header("content-length"), Some("42".to_string()));
        // the fast-path header must not leak into the generic map
        assert!(header.fields().get(http::header::CONTENT_LENGTH).is_none());

        assert!(header.remove_header("Content-Length"));
        assert_eq!(header.content_length(), None);
        assert_eq!(header.get_header("Content-Length"), None);
    }

    #[test]
    fn invalid_content_length_rejected() {
        let mut header = MessageHeader::new();
        assert!(header.set_header("Content-Length", "abc").is_err());
    }

    #[test]
    fn set_overwrites_add_accumulates() {
        let mut header = MessageHeader::new();
        header.add_header("Accept-Encoding", "gzip").unwrap();
        header.add_header("Accept-Encoding", "br").unwrap();
        assert_eq!(header.get_header_all("accept-encoding"), vec!["gzip", "br"]);

        header.set_header("Accept-Encoding", "identity").unwrap();
        assert_eq!(header.get_header_all("Accept-Encoding"), vec!["identity"]);
    }

    #[test]
    fn accept_sorted_by_quality() {
        let mut header = MessageHeader::new();
        header.set_header("Accept", "text/html;q=0.8, application/json;q=0.9, */*;q=0.1").unwrap();

        let accept = header.accept();
        let essences: Vec<String> = accept.iter().map(|m| m.essence_str().to_string()).collect();
        assert_eq!(essences, vec!["application/json", "text/html", "*/*"]);
    }

    #[test]
    fn accept_wildcard_tiebreak() {
        let mut header = MessageHeader::new();
        header.set_header("Accept", "*/*, text/*, text/plain").unwrap();

        let accept = header.accept();
        let essences: Vec<String> = accept.iter().map(|m| m.essence_str().to_string()).collect();
        assert_eq!(essences, vec!["text/plain", "text/*", "*/*"]);
    }

    #[test]
    fn hop_by_hop_removal() {
        let mut header = MessageHeader::new();
        header.set_header("Connection", "close, X-Tracking").unwrap();
        header.set_header("X-Tracking", "abc").unwrap();
        header.set_header("Keep-Alive", "timeout=5").unwrap();
        header.set_header("Upgrade", "websocket").unwrap();
        header.set_header("Transfer-Encoding", "chunked").unwrap();
        header.set_header("Host", "example.org").unwrap();

        header.remove_hop_by_hop_headers();

        assert!(!header.contains("Connection"));
        assert!(!header.contains("X-Tracking"));
        assert!(!header.contains("Keep-Alive"));
        assert!(!header.contains("Upgrade"));
        // chunked transfer-encoding survives
        assert_eq!(header.get_header("Transfer-Encoding"), Some("chunked".to_string()));
        assert_eq!(header.get_header("Host"), Some("example.org".to_string()));
    }

    #[test]
    fn hop_by_hop_drops_non_chunked_te() {
        let mut header = MessageHeader::new();
        header.set_header("Transfer-Encoding", "gzip").unwrap();
        header.remove_hop_by_hop_headers();
        assert!(!header.contains("Transfer-Encoding"));
    }

    #[test]
    fn encode_fast_fields_first() {
        let mut header = MessageHeader::new();
        header.set_header("Host", "example.org").unwrap();
        header.set_header("Content-Length", "5").unwrap();
        header.set_header("Content-Type", "text/plain").unwrap();

        let mut dst = BytesMut::new();
        header.encode(&mut dst);
        let text = String::from_utf8(dst.to_vec()).unwrap();

        assert!(text.starts_with("Content-Length: 5\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("host: example.org\r\n"));
    }
}
