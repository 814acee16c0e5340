//! HTTP request header handling.

use bytes::{BufMut, BytesMut};
use http::{Method, Uri, Version};

use crate::protocol::MessageHeader;

/// The header part of an HTTP request: method, URI, version and the message
/// header fields, plus the context path assigned by the dispatch layer.
#[derive(Debug, Clone)]
pub struct RequestHeader {
    method: Method,
    uri: Uri,
    version: Version,
    header: MessageHeader,
    context_path: Option<String>,
}

impl RequestHeader {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, version: Version::HTTP_11, header: MessageHeader::new(), context_path: None }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    /// The request path with matrix parameters stripped.
    pub fn path(&self) -> &str {
        self.uri.path().split(';').next().unwrap_or("")
    }

    /// The context path assigned by the dispatch layer, empty until set.
    pub fn context_path(&self) -> &str {
        self.context_path.as_deref().unwrap_or("")
    }

    pub fn set_context_path(&mut self, context_path: impl Into<String>) {
        self.context_path = Some(context_path.into());
    }

    /// The path below the context path, used to select a handler.
    pub fn handler_path(&self) -> &str {
        let path = self.path();
        path.strip_prefix(self.context_path()).unwrap_or(path)
    }

    /// Decoded query parameters in order of appearance.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let Some(query) = self.uri.query() else {
            return Vec::new();
        };
        parse_params(query, '&')
    }

    /// Returns every value of one query parameter.
    pub fn query_param(&self, name: &str) -> Vec<String> {
        self.query_params().into_iter().filter(|(n, _)| n == name).map(|(_, v)| v).collect()
    }

    /// Matrix parameters carried in the request path (`/res;k=v;k2=v2`).
    pub fn matrix_params(&self) -> Vec<(String, String)> {
        match self.uri.path().split_once(';') {
            Some((_, params)) => parse_params(params, ';'),
            None => Vec::new(),
        }
    }

    /// Whether this request's method carries a body. Bodyless methods:
    /// GET, HEAD, DELETE, TRACE, CONNECT, OPTIONS.
    pub fn need_body(&self) -> bool {
        !matches!(
            &self.method,
            &Method::GET | &Method::HEAD | &Method::DELETE | &Method::TRACE | &Method::CONNECT | &Method::OPTIONS
        )
    }

    /// Whether this request opens a WebSocket handshake.
    pub fn is_websocket_handshake(&self) -> bool {
        self.header.contains("Sec-WebSocket-Key")
    }

    /// Serializes the complete head block: request line, header fields and
    /// the terminating empty line. A bodyless method without an explicit
    /// length is forced to `Content-Length: 0`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(self.method.as_str().as_bytes());
        dst.put_slice(b" ");
        let target = self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        dst.put_slice(target.as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(version_token(self.version));
        dst.put_slice(b"\r\n");

        if !self.need_body() && self.header.content_length().is_none() && !self.header.is_chunked() {
            dst.put_slice(b"Content-Length: 0\r\n");
        }

        self.header.encode(dst);
        dst.put_slice(b"\r\n");
    }
}

pub(crate) fn version_token(version: Version) -> &'static [u8] {
    match version {
        Version::HTTP_10 => b"HTTP/1.0",
        Version::HTTP_09 => b"HTTP/0.9",
        _ => b"HTTP/1.1",
    }
}

pub(crate) fn parse_params(raw: &str, separator: char) -> Vec<(String, String)> {
    raw.split(separator)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (decode_component(name), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

/// Percent-decoding for query and matrix parameters; `+` decodes to space.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if let (Some(hi), Some(lo)) =
                    (bytes.get(i + 1).and_then(|b| hex_val(*b)), bytes.get(i + 2).and_then(|b| hex_val(*b)))
                {
                    out.push(hi << 4 | lo);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, target: &str) -> RequestHeader {
        RequestHeader::new(method, target.parse().unwrap())
    }

    #[test]
    fn query_params_decoded_in_order() {
        let req = request(Method::GET, "/search?a=1&b=hello+world&a=%2Fx");
        assert_eq!(
            req.query_params(),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "hello world".to_string()),
                ("a".to_string(), "/x".to_string()),
            ]
        );
        assert_eq!(req.query_param("a"), vec!["1", "/x"]);
    }

    #[test]
    fn matrix_params_split_from_path() {
        let req = request(Method::GET, "/resource;color=red;size=2?x=1");
        assert_eq!(req.path(), "/resource");
        assert_eq!(
            req.matrix_params(),
            vec![("color".to_string(), "red".to_string()), ("size".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn handler_path_below_context() {
        let mut req = request(Method::GET, "/api/users/42");
        req.set_context_path("/api");
        assert_eq!(req.handler_path(), "/users/42");
    }

    #[test]
    fn bodyless_methods() {
        for method in [Method::GET, Method::HEAD, Method::DELETE, Method::TRACE, Method::CONNECT, Method::OPTIONS] {
            assert!(!request(method, "/").need_body());
        }
        assert!(request(Method::POST, "/").need_body());
        assert!(request(Method::PUT, "/").need_body());
    }

    #[test]
    fn encode_forces_zero_length_for_bodyless_method() {
        let req = request(Method::GET, "/index.html");
        let mut dst = BytesMut::new();
        req.encode(&mut dst);
        let text = String::from_utf8(dst.to_vec()).unwrap();
        assert!(text.starts_with("GET /index.html HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
