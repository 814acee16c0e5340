//! Receive-activity tracking for the connection timeout.
//!
//! The receive timeout is measured from the last byte received, not from the
//! last decoded frame. [`TrackedReader`] records every productive read into a
//! shared [`ReceiveActivity`]; the connection loops derive their deadline
//! from it and extend the wait when bytes arrived without completing a frame.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;

/// Shared record of when the transport last produced bytes.
#[derive(Debug, Clone)]
pub(crate) struct ReceiveActivity {
    epoch: Instant,
    last_millis: Arc<AtomicU64>,
}

impl ReceiveActivity {
    pub(crate) fn new() -> Self {
        Self { epoch: Instant::now(), last_millis: Arc::new(AtomicU64::new(0)) }
    }

    pub(crate) fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_millis.store(elapsed, Ordering::Relaxed);
    }

    /// The deadline `limit` after the last byte received.
    pub(crate) fn deadline(&self, limit: Duration) -> Instant {
        self.epoch + Duration::from_millis(self.last_millis.load(Ordering::Relaxed)) + limit
    }
}

/// Reader wrapper feeding the arrival time of every byte into a
/// [`ReceiveActivity`].
#[derive(Debug)]
pub(crate) struct TrackedReader<R> {
    inner: R,
    activity: ReceiveActivity,
}

impl<R> TrackedReader<R> {
    pub(crate) fn new(inner: R, activity: ReceiveActivity) -> Self {
        Self { inner, activity }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackedReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            if buf.filled().len() > before {
                this.activity.touch();
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test(start_paused = true)]
    async fn deadline_follows_reads() {
        let activity = ReceiveActivity::new();
        let limit = Duration::from_secs(60);
        let initial = activity.deadline(limit);

        tokio::time::advance(Duration::from_secs(10)).await;
        let mut reader = TrackedReader::new(std::io::Cursor::new(b"data".to_vec()), activity.clone());
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();

        assert_eq!(activity.deadline(limit), initial + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_read_does_not_touch() {
        let activity = ReceiveActivity::new();
        let limit = Duration::from_secs(60);
        let initial = activity.deadline(limit);

        tokio::time::advance(Duration::from_secs(10)).await;
        let mut reader = TrackedReader::new(std::io::Cursor::new(Vec::new()), activity.clone());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        assert_eq!(activity.deadline(limit), initial);
    }
}
