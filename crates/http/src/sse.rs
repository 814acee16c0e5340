//! Server-sent event stream support.
//!
//! An [`Event`] serializes as `field: value\r\n` lines terminated by a blank
//! line. [`EventDecoder`] incrementally parses an event stream on the client
//! side.

use std::fmt;
use std::fmt::Write as _;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::ParseError;

/// One event of an event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    event: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
    data: Option<String>,
    comment: Option<String>,
}

impl Event {
    pub fn new() -> Self {
        Default::default()
    }

    /// A data-only event.
    pub fn data(data: impl Into<String>) -> Self {
        Self { data: Some(data.into()), ..Default::default() }
    }

    /// A comment-only event, usable as a keep-alive.
    pub fn comment(comment: impl Into<String>) -> Self {
        Self { comment: Some(comment.into()), ..Default::default() }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, millis: u64) -> Self {
        self.retry = Some(millis);
        self
    }

    pub fn event_name(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    pub fn data_value(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn comment_value(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Parses one complete event block (without the terminating blank line).
    /// Multiple `data:` lines concatenate without a separator.
    pub fn parse(block: &str) -> Result<Self, ParseError> {
        let mut event = Event::new();
        for raw_line in block.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix(':') {
                let comment = comment.strip_prefix(' ').unwrap_or(comment);
                match &mut event.comment {
                    Some(existing) => existing.push_str(comment),
                    None => event.comment = Some(comment.to_string()),
                }
                continue;
            }

            let Some((field, value)) = line.split_once(':') else {
                return Err(ParseError::invalid_body(format!("event line without colon: {line}")));
            };
            let value = value.strip_prefix(' ').unwrap_or(value);

            match field {
                "event" => event.event = Some(value.to_string()),
                "id" => event.id = Some(value.to_string()),
                "retry" => {
                    event.retry =
                        Some(value.parse().map_err(|_| ParseError::invalid_body("retry value is not numeric"))?)
                }
                "data" => match &mut event.data {
                    Some(existing) => existing.push_str(value),
                    None => event.data = Some(value.to_string()),
                },
                // unknown fields are ignored per the event stream format
                _ => trace!(field, "ignoring unknown event field"),
            }
        }
        Ok(event)
    }
}

impl fmt::Display for Event {
    /// The wire form: one `field: value\r\n` per line, terminated by a blank
    /// line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(comment) = &self.comment {
            writeln!(f, ": {comment}\r")?;
        }
        if let Some(event) = &self.event {
            writeln!(f, "event: {event}\r")?;
        }
        if let Some(id) = &self.id {
            writeln!(f, "id: {id}\r")?;
        }
        if let Some(retry) = self.retry {
            writeln!(f, "retry: {retry}\r")?;
        }
        if let Some(data) = &self.data {
            for line in data.split('\n') {
                writeln!(f, "data: {line}\r")?;
            }
        }
        f.write_str("\r\n")
    }
}

/// Incremental decoder for an event stream.
#[derive(Debug, Default)]
pub struct EventDecoder;

impl Decoder for EventDecoder {
    type Item = Event;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // an event ends at the first blank line
        let Some(end) = find_blank_line(src) else {
            return Ok(None);
        };
        let block = src.split_to(end);
        let text = std::str::from_utf8(&block)
            .map_err(|_| ParseError::invalid_body("event stream is not valid utf-8"))?;
        let event = Event::parse(text)?;
        trace!(?event, "decoded event");
        Ok(Some(event))
    }
}

/// Finds the offset past the blank line terminating the first event block.
fn find_blank_line(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (i, byte) in buf.iter().enumerate() {
        if *byte == b'\n' {
            let mut line = &buf[line_start..i];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                return Some(i + 1);
            }
            line_start = i + 1;
        }
    }
    None
}

/// Serializes an event into a string buffer, for sinks that batch events.
pub fn write_event(out: &mut String, event: &Event) {
    // Display never fails into a String
    let _ = write!(out, "{event}");
}
