//! HTTP response header handling.

use bytes::{BufMut, BytesMut};
use http::{StatusCode, Version};

use crate::protocol::request::version_token;
use crate::protocol::MessageHeader;

/// The header part of an HTTP response: status, reason phrase, version and
/// the message header fields.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    header: MessageHeader,
}

impl ResponseHeader {
    pub fn new(status: StatusCode) -> Self {
        Self { status, reason: None, version: Version::HTTP_11, header: MessageHeader::new() }
    }

    pub fn with_reason(status: StatusCode, reason: impl Into<String>) -> Self {
        Self { status, reason: Some(reason.into()), version: Version::HTTP_11, header: MessageHeader::new() }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// The reason phrase: the one received on the wire if any, otherwise the
    /// canonical phrase for the status code.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
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

    /// Status codes that never carry a body: 1xx, 204, 304.
    pub fn is_bodyless_status(&self) -> bool {
        self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED
    }

    /// Whether the Upgrade header names the websocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header
            .get_header("Upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }

    /// Whether the content type is `multipart/byteranges`.
    pub fn is_multipart_byteranges(&self) -> bool {
        self.header
            .content_type()
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/byteranges"))
            .unwrap_or(false)
    }

    /// The boundary parameter of a multipart content type, if any.
    pub fn multipart_boundary(&self) -> Option<String> {
        use std::str::FromStr;

        let value = self.header.content_type()?.to_str().ok()?;
        let mime = mime::Mime::from_str(value.trim()).ok()?;
        Some(mime.get_param(mime::BOUNDARY)?.as_str().to_string())
    }

    /// Whether the Connection header requests closing the connection.
    pub fn is_connection_close(&self) -> bool {
        self.header
            .get_header_all("Connection")
            .iter()
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("close"))
    }

    /// Connection persistence after this message: HTTP/1.1 is persistent
    /// unless closed, HTTP/1.0 only with keep-alive, HTTP/0.9 never.
    pub fn is_persistent(&self) -> bool {
        match self.version {
            Version::HTTP_11 => !self.is_connection_close(),
            Version::HTTP_10 => self
                .header
                .get_header("Connection")
                .map(|v| v.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Serializes the complete head block: status line, header fields and
    /// the terminating empty line.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(version_token(self.version));
        dst.put_slice(b" ");
        dst.put_slice(self.status.as_str().as_bytes());
        dst.put_slice(b" ");
        dst.put_slice(self.reason().as_bytes());
        dst.put_slice(b"\r\n");
        self.header.encode(dst);
        dst.put_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodyless_statuses() {
        assert!(ResponseHeader::new(StatusCode::CONTINUE).is_bodyless_status());
        assert!(ResponseHeader::new(StatusCode::NO_CONTENT).is_bodyless_status());
        assert!(ResponseHeader::new(StatusCode::NOT_MODIFIED).is_bodyless_status());
        assert!(!ResponseHeader::new(StatusCode::OK).is_bodyless_status());
    }

    #[test]
    fn encode_status_line() {
        let mut head = ResponseHeader::new(StatusCode::NOT_FOUND);
        head.header_mut().set_header("Content-Length", "0").unwrap();

        let mut dst = BytesMut::new();
        head.encode(&mut dst);
        let text = String::from_utf8(dst.to_vec()).unwrap();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn custom_reason_preserved() {
        let head = ResponseHeader::with_reason(StatusCode::OK, "Okey Dokey");
        assert_eq!(head.reason(), "Okey Dokey");
    }

    #[test]
    fn multipart_boundary_extracted() {
        let mut head = ResponseHeader::new(StatusCode::PARTIAL_CONTENT);
        head.header_mut()
            .set_header("Content-Type", "multipart/byteranges; boundary=THIS_STRING_SEPARATES")
            .unwrap();
        assert!(head.is_multipart_byteranges());
        assert_eq!(head.multipart_boundary().as_deref(), Some("THIS_STRING_SEPARATES"));

        let plain = ResponseHeader::new(StatusCode::OK);
        assert_eq!(plain.multipart_boundary(), None);
    }

    #[test]
    fn persistence_rules() {
        let mut head = ResponseHeader::new(StatusCode::OK);
        assert!(head.is_persistent());

        head.header_mut().set_header("Connection", "close").unwrap();
        assert!(!head.is_persistent());

        let mut head10 = ResponseHeader::new(StatusCode::OK);
        head10.set_version(Version::HTTP_10);
        assert!(!head10.is_persistent());
        head10.header_mut().set_header("Connection", "keep-alive").unwrap();
        assert!(head10.is_persistent());
    }
}
