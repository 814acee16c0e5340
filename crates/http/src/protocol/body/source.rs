//! Non-blocking body data source.
//!
//! A [`BodySource`] accumulates decoded body bytes on the network side and
//! hands them to a consumer without blocking. The consumer reads what is
//! available; the producer appends chunks as they arrive and marks the source
//! complete (or destroyed) when the body ends.

use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::protocol::SourceError;

/// Lifecycle of a body source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    /// Data may still arrive.
    Receiving,
    /// All body bytes have arrived; buffered data stays readable.
    Complete,
    /// The source was torn down; reads and appends fail.
    Destroyed(String),
}

struct Inner {
    buffer: BytesMut,
    state: SourceState,
    /// `true` for messages that statically carry no body, where
    /// `available()` answers `None` instead of a count.
    absent: bool,
    suspended: bool,
    /// A data notification arrived while suspended and awaits replay.
    pending_notice: bool,
    data_listeners: Vec<oneshot::Sender<()>>,
    end_listeners: Vec<oneshot::Sender<SourceState>>,
    resume_listeners: Vec<oneshot::Sender<()>>,
}

/// Shared, non-blocking accumulator for message body data.
///
/// Clones share the same underlying buffer and state. All operations are
/// lock-guarded and non-blocking; waiting for data happens through the
/// single-shot listeners.
#[derive(Clone)]
pub struct BodySource {
    inner: Arc<Mutex<Inner>>,
}

impl BodySource {
    pub fn new() -> Self {
        Self::with_absent(false)
    }

    /// A source for a message that carries no body at all.
    pub fn absent() -> Self {
        let source = Self::with_absent(true);
        source.set_complete();
        source
    }

    /// A complete in-memory source over the given bytes.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let source = Self::new();
        // fresh source, cannot be terminal yet
        let _ = source.append(bytes);
        source.set_complete();
        source
    }

    /// A complete source over a file's contents.
    pub async fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let contents = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(Bytes::from(contents)))
    }

    fn with_absent(absent: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buffer: BytesMut::new(),
                state: SourceState::Receiving,
                absent,
                suspended: false,
                pending_notice: false,
                data_listeners: Vec::new(),
                end_listeners: Vec::new(),
                resume_listeners: Vec::new(),
            })),
        }
    }

    /// Appends a decoded chunk. Fails once the source reached a terminal
    /// state.
    pub fn append(&self, bytes: Bytes) -> Result<(), SourceError> {
        let mut inner = self.inner.lock().unwrap();
        match &inner.state {
            SourceState::Receiving => {}
            SourceState::Complete => return Err(SourceError::TerminalState),
            SourceState::Destroyed(reason) => return Err(SourceError::Destroyed { reason: reason.clone() }),
        }

        trace!(len = bytes.len(), "body source received data");
        inner.buffer.extend_from_slice(&bytes);

        if inner.suspended {
            inner.pending_notice = true;
        } else {
            notify_data(&mut inner);
        }
        Ok(())
    }

    /// Number of readable bytes, or `None` when the message statically has
    /// no body.
    pub fn available(&self) -> Option<usize> {
        let inner = self.inner.lock().unwrap();
        if inner.absent {
            None
        } else {
            Some(inner.buffer.len())
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, SourceState::Complete)
    }

    pub fn state(&self) -> SourceState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Reads exactly `n` bytes, or fails with `Underflow` when fewer are
    /// buffered.
    pub fn read_by_length(&self, n: usize) -> Result<Bytes, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        if let SourceState::Destroyed(reason) = &inner.state {
            return Err(SourceError::Destroyed { reason: reason.clone() });
        }
        if inner.buffer.len() < n {
            return Err(SourceError::Underflow { requested: n, available: inner.buffer.len() });
        }
        Ok(inner.buffer.split_to(n).freeze())
    }

    /// Reads everything currently buffered.
    pub fn read_available(&self) -> Result<Bytes, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        if let SourceState::Destroyed(reason) = &inner.state {
            return Err(SourceError::Destroyed { reason: reason.clone() });
        }
        let len = inner.buffer.len();
        Ok(inner.buffer.split_to(len).freeze())
    }

    /// Marks the body complete. Idempotent; the first call fires the end
    /// listeners, later calls (and calls after destroy) are no-ops.
    pub fn set_complete(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SourceState::Receiving {
            return;
        }
        inner.state = SourceState::Complete;
        debug!(buffered = inner.buffer.len(), "body source complete");
        notify_end(&mut inner);
    }

    /// Tears the source down. Idempotent like [`set_complete`]; buffered but
    /// unread data is discarded and subsequent reads fail.
    ///
    /// [`set_complete`]: Self::set_complete
    pub fn destroy(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SourceState::Receiving {
            return;
        }
        let reason = reason.into();
        debug!(%reason, "body source destroyed");
        inner.state = SourceState::Destroyed(reason);
        inner.buffer.clear();
        notify_end(&mut inner);
    }

    /// Suspends data notifications. Returns `false` when already suspended.
    pub fn suspend(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.suspended {
            return false;
        }
        inner.suspended = true;
        true
    }

    /// Resumes data notifications, replaying one suppressed notification if
    /// data arrived while suspended. Returns `false` when not suspended.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.suspended {
            return false;
        }
        inner.suspended = false;
        for listener in inner.resume_listeners.drain(..) {
            let _ = listener.send(());
        }
        if inner.pending_notice {
            inner.pending_notice = false;
            notify_data(&mut inner);
        }
        true
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().unwrap().suspended
    }

    /// Registers a single-shot listener fired on the next [`resume`]. Fires
    /// immediately when the source is not suspended or already terminal.
    ///
    /// The network side waits on this before reading more transport bytes,
    /// so a suspended source backpressures the peer instead of buffering.
    ///
    /// [`resume`]: Self::resume
    pub fn on_resume(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        if !inner.suspended || inner.state != SourceState::Receiving {
            let _ = tx.send(());
        } else {
            inner.resume_listeners.push(tx);
        }
        rx
    }

    /// Registers a single-shot listener fired on the next data notification.
    pub fn on_data(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        // already terminal or data buffered: fire immediately
        if !inner.buffer.is_empty() || inner.state != SourceState::Receiving {
            let _ = tx.send(());
        } else {
            inner.data_listeners.push(tx);
        }
        rx
    }

    /// Registers a single-shot listener fired when the source reaches a
    /// terminal state. Fires immediately when it already has.
    pub fn on_end(&self) -> oneshot::Receiver<SourceState> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SourceState::Receiving {
            let _ = tx.send(inner.state.clone());
        } else {
            inner.end_listeners.push(tx);
        }
        rx
    }

    /// Drains the source into a single buffer once complete. Intended for
    /// tests and small bodies.
    pub fn to_bytes(&self) -> Result<Bytes, SourceError> {
        let inner = self.inner.lock().unwrap();
        match &inner.state {
            SourceState::Destroyed(reason) => Err(SourceError::Destroyed { reason: reason.clone() }),
            _ => Ok(Bytes::copy_from_slice(inner.buffer.chunk())),
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        Self::new()
    }
}

fn notify_data(inner: &mut Inner) {
    for listener in inner.data_listeners.drain(..) {
        let _ = listener.send(());
    }
}

fn notify_end(inner: &mut Inner) {
    let state = inner.state.clone();
    for listener in inner.end_listeners.drain(..) {
        let _ = listener.send(state.clone());
    }
    // a terminal source no longer suspends anything
    for listener in inner.resume_listeners.drain(..) {
        let _ = listener.send(());
    }
    // end of body is also a data event for consumers waiting on reads
    notify_data(inner);
}
