//! `application/x-www-form-urlencoded` request bodies.

use bytes::Bytes;

use crate::protocol::body::source::BodySource;
use crate::protocol::request::parse_params;

/// Builder for form-urlencoded request bodies.
///
/// Parameters keep insertion order; names and values are percent-encoded on
/// serialization, spaces as `+`.
#[derive(Debug, Clone, Default)]
pub struct FormUrlEncodedBody {
    params: Vec<(String, String)>,
}

impl FormUrlEncodedBody {
    pub const CONTENT_TYPE: &'static str = "application/x-www-form-urlencoded";

    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an encoded body back into its parameter list.
    pub fn parse(raw: &str) -> Self {
        Self { params: parse_params(raw, '&') }
    }

    pub fn add_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Every value recorded for one parameter name.
    pub fn param(&self, name: &str) -> Vec<&str> {
        self.params.iter().filter(|(n, _)| n == name).map(|(_, v)| v.as_str()).collect()
    }

    /// The encoded wire form.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.params {
            if !out.is_empty() {
                out.push('&');
            }
            encode_component(name, &mut out);
            out.push('=');
            encode_component(value, &mut out);
        }
        out
    }

    /// A complete body source over the encoded form.
    pub fn into_source(self) -> BodySource {
        BodySource::from_bytes(Bytes::from(self.encode()))
    }
}

fn encode_component(raw: &str, out: &mut String) {
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => out.push(byte as char),
            b' ' => out.push('+'),
            b => {
                out.push('%');
                out.push_str(&format!("{b:02X}"));
            }
        }
    }
}
