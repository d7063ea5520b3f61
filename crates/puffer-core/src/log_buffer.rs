//! Bounded console history with live broadcast.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Default number of console lines kept per channel.
pub const DEFAULT_LOG_RETENTION: usize = 1000;

/// Default history size limit (8 MB).
const HISTORY_BYTES: usize = 8 * 1024 * 1024;

/// Live broadcast capacity; slow receivers skip lagged lines.
const BROADCAST_CAPACITY: usize = 1024;

struct Inner {
    lines: VecDeque<String>,
    total_bytes: usize,
}

/// Ring buffer of console output lines.
///
/// Oldest lines are evicted once either the line limit or the byte limit
/// is exceeded. Every pushed line is also sent to live receivers.
pub struct LogBuffer {
    inner: RwLock<Inner>,
    max_lines: usize,
    max_bytes: usize,
    sender: broadcast::Sender<String>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_RETENTION)
    }
}

impl LogBuffer {
    /// Create a buffer keeping at most `max_lines` lines.
    #[must_use]
    pub fn new(max_lines: usize) -> Self {
        Self::with_limits(max_lines, HISTORY_BYTES)
    }

    /// Create a buffer with explicit line and byte limits.
    #[must_use]
    pub fn with_limits(max_lines: usize, max_bytes: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                lines: VecDeque::with_capacity(max_lines.min(64)),
                total_bytes: 0,
            }),
            max_lines,
            max_bytes,
            sender,
        }
    }

    /// Append one line to history and live receivers.
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        let _ = self.sender.send(line.clone());

        if self.max_lines == 0 {
            return;
        }

        let bytes = line.len();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        while inner.lines.len() >= self.max_lines
            || (!inner.lines.is_empty()
                && inner.total_bytes.saturating_add(bytes) > self.max_bytes)
        {
            match inner.lines.pop_front() {
                Some(front) => inner.total_bytes = inner.total_bytes.saturating_sub(front.len()),
                None => break,
            }
        }
        inner.lines.push_back(line);
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Append several lines in order.
    pub fn extend<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(line);
        }
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .len()
    }

    /// Whether no lines are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Line retention limit.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_lines
    }

    /// Drop all retained lines.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.lines.clear();
        inner.total_bytes = 0;
    }

    /// Get a receiver for live lines.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Snapshot of the retained lines, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .iter()
            .cloned()
            .collect()
    }

    /// Stream of live lines only.
    #[must_use]
    pub fn live_stream(&self) -> BoxStream<'static, String> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }

    /// Stream that yields retained history first, then live lines.
    #[must_use]
    pub fn history_plus_stream(&self) -> BoxStream<'static, String> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        hist.chain(live).boxed()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    #[test]
    fn test_retention_evicts_oldest() {
        let buffer = LogBuffer::new(3);
        buffer.extend(["a", "b", "c", "d", "e"]);
        assert_eq!(buffer.history(), vec!["c", "d", "e"]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_byte_limit_evicts_oldest() {
        let buffer = LogBuffer::with_limits(100, 10);
        buffer.extend(["12345", "67890", "abc"]);
        assert_eq!(buffer.history(), vec!["67890", "abc"]);
    }

    #[test]
    fn test_oversized_line_is_still_kept() {
        let buffer = LogBuffer::with_limits(100, 4);
        buffer.push("this line is longer than the byte limit");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_zero_retention_keeps_nothing_but_broadcasts() {
        let buffer = LogBuffer::new(0);
        let mut rx = buffer.subscribe();
        buffer.push("line");
        assert!(buffer.is_empty());
        assert_eq!(rx.try_recv().unwrap(), "line");
    }

    #[test]
    fn test_clear() {
        let buffer = LogBuffer::default();
        buffer.push("x");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_LOG_RETENTION);
    }

    #[test]
    fn test_live_stream_waits_for_push() {
        let buffer = LogBuffer::new(10);
        buffer.push("before");
        let mut live = buffer.live_stream();
        let mut next = task::spawn(live.next());
        assert_pending!(next.poll());

        buffer.push("after");
        assert!(next.is_woken());
        assert_ready_eq!(next.poll(), Some("after".to_string()));
    }

    #[tokio::test]
    async fn test_history_then_live() {
        let buffer = LogBuffer::new(10);
        buffer.extend(["old-1", "old-2"]);

        let mut stream = buffer.history_plus_stream();
        buffer.push("new");

        assert_eq!(stream.next().await.as_deref(), Some("old-1"));
        assert_eq!(stream.next().await.as_deref(), Some("old-2"));
        assert_eq!(stream.next().await.as_deref(), Some("new"));
    }
}
