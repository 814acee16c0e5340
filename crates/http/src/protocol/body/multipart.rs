//! Multipart body writing and parsing.
//!
//! The sink side frames named sub-parts between `--boundary` delimiters for
//! `multipart/*` responses. The decoder side incrementally parses a
//! `multipart/byteranges` payload, delivering part headers and data as they
//! arrive.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::codec::header::lines;
use crate::protocol::body::sink::{BodySink, SinkState};
use crate::protocol::{MessageHead, ParseError, SendError};

/// Identifier of one sub-part of a [`MultipartSink`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PartId(usize);

struct Part {
    id: PartId,
    headers: Vec<(String, String)>,
    buffered: Vec<Bytes>,
    closed: bool,
}

/// Sink framing boundary-delimited sub-parts into an inner body sink.
///
/// Exactly one part is active at a time. Parts opened while another is
/// active buffer their writes and are replayed verbatim once they become
/// active. Closing the sink with parts still open defers the final boundary
/// until the last part completes.
pub struct MultipartSink<S: BodySink> {
    inner: S,
    boundary: String,
    parts: VecDeque<Part>,
    next_id: usize,
    active_started: bool,
    state: SinkState,
}

impl<S: BodySink> MultipartSink<S> {
    pub fn new(inner: S, boundary: impl Into<String>) -> Self {
        Self {
            inner,
            boundary: boundary.into(),
            parts: VecDeque::new(),
            next_id: 0,
            active_started: false,
            state: SinkState::Open,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Opens a new sub-part. It becomes active immediately when no other
    /// part is open, otherwise it queues behind the active one.
    pub fn open_part(&mut self, headers: Vec<(String, String)>) -> Result<PartId, SendError> {
        if self.state == SinkState::Closed {
            return Err(SendError::Closed);
        }
        let id = PartId(self.next_id);
        self.next_id += 1;
        self.parts.push_back(Part { id, headers, buffered: Vec::new(), closed: false });
        trace!(part = id.0, queued = self.parts.len(), "opened multipart sub-part");
        self.start_active_if_needed()?;
        Ok(id)
    }

    /// Writes body bytes into a sub-part. Writes to a non-active part are
    /// buffered.
    pub fn write_part(&mut self, id: PartId, bytes: Bytes) -> Result<(), SendError> {
        if self.state == SinkState::Closed {
            return Err(SendError::Closed);
        }
        let is_active = self.parts.front().is_some_and(|p| p.id == id);
        if is_active {
            self.inner.write(bytes)?;
            return Ok(());
        }
        match self.parts.iter_mut().find(|p| p.id == id && !p.closed) {
            Some(part) => {
                part.buffered.push(bytes);
                Ok(())
            }
            None => Err(SendError::Closed),
        }
    }

    /// Closes a sub-part. When the active part closes, the next queued part
    /// is replayed and becomes active.
    pub fn close_part(&mut self, id: PartId) -> Result<(), SendError> {
        let is_active = self.parts.front().is_some_and(|p| p.id == id);
        if is_active {
            self.parts.pop_front();
            self.active_started = false;
            self.inner.write(Bytes::from_static(b"\r\n"))?;
            self.start_active_if_needed()?;
            self.finish_if_closing()?;
            return Ok(());
        }
        match self.parts.iter_mut().find(|p| p.id == id) {
            Some(part) => {
                part.closed = true;
                Ok(())
            }
            None => Err(SendError::Closed),
        }
    }

    /// Requests close. With sub-parts still pending the sink enters
    /// `Closing` and the final boundary is deferred until they complete.
    pub fn close(&mut self) -> Result<(), SendError> {
        if self.state == SinkState::Closed {
            return Ok(());
        }
        self.state = SinkState::Closing;
        self.finish_if_closing()
    }

    pub fn take_output(&mut self) -> Bytes {
        self.inner.take_output()
    }

    fn start_active_if_needed(&mut self) -> Result<(), SendError> {
        loop {
            if self.active_started {
                return Ok(());
            }
            let Some(part) = self.parts.front_mut() else {
                return Ok(());
            };

            let mut frame = BytesMut::new();
            frame.extend_from_slice(b"--");
            frame.extend_from_slice(self.boundary.as_bytes());
            frame.extend_from_slice(b"\r\n");
            for (name, value) in &part.headers {
                frame.extend_from_slice(name.as_bytes());
                frame.extend_from_slice(b": ");
                frame.extend_from_slice(value.as_bytes());
                frame.extend_from_slice(b"\r\n");
            }
            frame.extend_from_slice(b"\r\n");

            let buffered: Vec<Bytes> = std::mem::take(&mut part.buffered);
            let part_closed = part.closed;
            let part_id = part.id.0;
            self.active_started = true;

            self.inner.write(frame.freeze())?;
            for bytes in buffered {
                self.inner.write(bytes)?;
            }
            trace!(part = part_id, "multipart sub-part active");

            if part_closed {
                self.parts.pop_front();
                self.active_started = false;
                self.inner.write(Bytes::from_static(b"\r\n"))?;
                continue;
            }
            return Ok(());
        }
    }

    fn finish_if_closing(&mut self) -> Result<(), SendError> {
        if self.state != SinkState::Closing || !self.parts.is_empty() {
            return Ok(());
        }
        let mut tail = BytesMut::new();
        tail.extend_from_slice(b"--");
        tail.extend_from_slice(self.boundary.as_bytes());
        tail.extend_from_slice(b"--\r\n");
        self.inner.write(tail.freeze())?;
        self.inner.close()?;
        self.state = SinkState::Closed;
        debug!("multipart sink closed");
        Ok(())
    }

    pub fn head_mut(&mut self) -> &mut MessageHead {
        self.inner.head_mut()
    }
}

/// One parsed item of a multipart payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartItem {
    /// Headers of the next part.
    PartHead(Vec<(String, String)>),
    /// Body bytes of the current part.
    PartChunk(Bytes),
    /// The current part ended.
    PartEnd,
    /// The closing delimiter was seen; no more parts follow.
    End,
}

#[derive(Debug, PartialEq, Eq)]
enum DecodeState {
    Preamble,
    /// A boundary line was consumed; `--` or CRLF decides what follows.
    AfterBoundary,
    PartHeader,
    PartBody,
    Finished,
}

/// Incremental parser for `multipart/byteranges` payloads.
///
/// Feed raw body bytes through the [`Decoder`] interface; items are emitted
/// as soon as they are complete, so large parts stream without buffering.
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    state: DecodeState,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self { delimiter, state: DecodeState::Preamble }
    }

    pub fn is_finished(&self) -> bool {
        self.state == DecodeState::Finished
    }
}

impl Decoder for MultipartDecoder {
    type Item = MultipartItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Preamble => {
                    // first boundary has no preceding CRLF requirement, scan
                    // for the dash-boundary anywhere in the preamble
                    let dash_boundary = &self.delimiter[2..];
                    match find(src, dash_boundary) {
                        Some(pos) => {
                            let _ = src.split_to(pos + dash_boundary.len());
                            self.state = DecodeState::AfterBoundary;
                        }
                        None => {
                            keep_tail(src, dash_boundary.len());
                            return Ok(None);
                        }
                    }
                }

                // a boundary line was consumed: `--` closes the stream,
                // CRLF opens the next part's headers
                DecodeState::AfterBoundary => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] == b"--" {
                        let _ = src.split_to(2);
                        self.state = DecodeState::Finished;
                        return Ok(Some(MultipartItem::End));
                    }
                    if &src[..2] == b"\r\n" {
                        let _ = src.split_to(2);
                        self.state = DecodeState::PartHeader;
                        continue;
                    }
                    return Err(ParseError::invalid_body("garbage after multipart boundary"));
                }

                DecodeState::PartHeader => match lines::find_header_block_end(src) {
                    Some(end) => {
                        let block = src.split_to(end);
                        let headers = lines::parse_header_lines(&block)?;
                        self.state = DecodeState::PartBody;
                        trace!(header_count = headers.len(), "parsed multipart part headers");
                        return Ok(Some(MultipartItem::PartHead(headers)));
                    }
                    None => return Ok(None),
                },

                DecodeState::PartBody => match find(src, &self.delimiter) {
                    Some(0) => {
                        let _ = src.split_to(self.delimiter.len());
                        self.state = DecodeState::AfterBoundary;
                        return Ok(Some(MultipartItem::PartEnd));
                    }
                    Some(pos) => {
                        let data = src.split_to(pos).freeze();
                        return Ok(Some(MultipartItem::PartChunk(data)));
                    }
                    None => {
                        // emit what cannot be part of a split delimiter
                        if src.len() > self.delimiter.len() {
                            let safe = src.len() - self.delimiter.len();
                            let data = src.split_to(safe).freeze();
                            return Ok(Some(MultipartItem::PartChunk(data)));
                        }
                        return Ok(None);
                    }
                },

                DecodeState::Finished => return Ok(None),
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Discards scanned preamble bytes, keeping a tail that could still begin a
/// delimiter.
fn keep_tail(src: &mut BytesMut, tail: usize) {
    if src.len() > tail {
        let _ = src.split_to(src.len() - tail);
    }
}
