//! Output buffering for interactive shells.
//!
//! The transport pushes data and close events into an [`OutputBuffer`]
//! through a [`ShellEventSink`]; readers wait on it with a timeout.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug)]
struct Inner {
    bytes: Vec<u8>,
    active: bool,
}

impl Inner {
    /// Length of the prefix that is safe to hand out as text. An incomplete
    /// UTF-8 sequence at the end is held back until the rest arrives, unless
    /// the channel is gone.
    fn ready_len(&self) -> usize {
        if !self.active {
            return self.bytes.len();
        }
        match std::str::from_utf8(&self.bytes) {
            Ok(_) => self.bytes.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.bytes.len(),
        }
    }

    fn capture(&mut self, clear: bool) -> String {
        let len = self.ready_len();
        let text = String::from_utf8_lossy(&self.bytes[..len]).into_owned();
        if clear {
            self.bytes.drain(..len);
        }
        text
    }
}

/// Append-only output buffer with a wake-up signal for pending reads.
#[derive(Debug)]
pub struct OutputBuffer {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                bytes: Vec::new(),
                active: true,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A plain byte buffer has no invariant a panicking writer could break.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append received data and wake pending readers.
    pub fn push(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.lock().bytes.extend_from_slice(data);
        trace!("shell buffer: appended {} bytes", data.len());
        self.notify.notify_waiters();
    }

    /// Mark the channel as closed and wake pending readers.
    pub fn close(&self) {
        self.lock().active = false;
        self.notify.notify_waiters();
    }

    /// Whether the channel feeding this buffer is still open.
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return buffered text, waiting up to `timeout` for data if there is
    /// none yet.
    ///
    /// Returns immediately when text is already buffered or the channel is
    /// closed. Otherwise whichever of new data and the timer comes first
    /// ends the wait, and whatever is buffered at that point is returned,
    /// possibly an empty string. With `clear`, the returned text is removed
    /// from the buffer in the same critical section it was captured in.
    pub async fn read(&self, timeout: Duration, clear: bool) -> String {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a push between the check and the
        // await still wakes us.
        notified.as_mut().enable();

        {
            let mut inner = self.lock();
            if inner.ready_len() > 0 || !inner.active {
                return inner.capture(clear);
            }
        }

        if tokio::time::timeout(timeout, notified).await.is_err() {
            trace!("shell buffer: read timed out after {:?}", timeout);
        }

        self.lock().capture(clear)
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Event hooks handed to the transport when a shell channel is opened.
///
/// Safe to call from blocking threads.
#[derive(Debug, Clone)]
pub struct ShellEventSink {
    buffer: Arc<OutputBuffer>,
}

impl ShellEventSink {
    pub fn new(buffer: Arc<OutputBuffer>) -> Self {
        Self { buffer }
    }

    /// Data arrived from the remote side.
    pub fn data(&self, bytes: &[u8]) {
        self.buffer.push(bytes);
    }

    /// The channel closed.
    pub fn closed(&self) {
        self.buffer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_returns_buffered_immediately() {
        let buffer = OutputBuffer::new();
        buffer.push(b"hello ");
        buffer.push(b"world");

        let text = buffer.read(Duration::from_secs(60), true).await;
        assert_eq!(text, "hello world");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_read_without_clear_keeps_data() {
        let buffer = OutputBuffer::new();
        buffer.push(b"prompt$ ");

        assert_eq!(buffer.read(Duration::from_millis(10), false).await, "prompt$ ");
        assert_eq!(buffer.read(Duration::from_millis(10), false).await, "prompt$ ");
        assert_eq!(buffer.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_empty() {
        let buffer = OutputBuffer::new();
        let started = tokio::time::Instant::now();

        let text = buffer.read(Duration::from_millis(100), true).await;
        assert_eq!(text, "");
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_wakes_on_data() {
        let buffer = Arc::new(OutputBuffer::new());
        let sink = ShellEventSink::new(Arc::clone(&buffer));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sink.data(b"Password: ");
        });

        let started = tokio::time::Instant::now();
        let text = buffer.read(Duration::from_secs(5), true).await;
        assert_eq!(text, "Password: ");
        assert!(started.elapsed() < Duration::from_secs(5));
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_wakes_on_close() {
        let buffer = Arc::new(OutputBuffer::new());
        let sink = ShellEventSink::new(Arc::clone(&buffer));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sink.closed();
        });

        let started = tokio::time::Instant::now();
        assert_eq!(buffer.read(Duration::from_secs(5), true).await, "");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!buffer.is_active());
    }

    #[tokio::test]
    async fn test_closed_buffer_still_drains() {
        let buffer = OutputBuffer::new();
        buffer.push(b"logout\r\n");
        buffer.close();

        assert_eq!(buffer.read(Duration::from_secs(5), true).await, "logout\r\n");
        assert_eq!(buffer.read(Duration::from_secs(5), true).await, "");
    }

    #[tokio::test]
    async fn test_split_utf8_held_back() {
        let buffer = OutputBuffer::new();
        let snowman = "☃".as_bytes();
        buffer.push(b"a");
        buffer.push(&snowman[..1]);

        assert_eq!(buffer.read(Duration::from_millis(1), true).await, "a");
        assert_eq!(buffer.len(), 1);

        buffer.push(&snowman[1..]);
        assert_eq!(buffer.read(Duration::from_millis(1), true).await, "☃");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sink_close_deactivates_buffer() {
        let buffer = Arc::new(OutputBuffer::new());
        let sink = ShellEventSink::new(Arc::clone(&buffer));
        assert!(buffer.is_active());
        sink.closed();
        assert!(!buffer.is_active());
    }
}
