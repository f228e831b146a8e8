use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use tokio::time::Instant;
use tracing::warn;

use super::{LifecycleListener, Listeners, ResponseSink, SinkEvent};
use crate::protocol::{SendError, StatusText};

/// Everything a [`MemorySink`] has observed so far.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub status: Option<StatusCode>,
    pub status_text: Option<String>,
    /// One entry per header line, in the order they were appended.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub committed_at: Option<Instant>,
    pub chunks: Vec<Bytes>,
    pub chunk_times: Vec<Instant>,
    pub ended: bool,
    pub events: Vec<SinkEvent>,
    /// Writes attempted after the sink was disconnected.
    pub writes_after_close: usize,
}

impl Recorded {
    pub fn header_values(&self, name: &str) -> Vec<&HeaderValue> {
        self.headers.iter().filter(|(n, _)| n.as_str().eq_ignore_ascii_case(name)).map(|(_, v)| v).collect()
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|chunk| chunk.iter().copied()).collect()
    }
}

#[derive(Debug, Default)]
struct Shared {
    recorded: Recorded,
    closed: bool,
    listeners: Listeners,
}

/// A sink that keeps the response in memory.
///
/// The paired [`MemorySinkHandle`] can inspect the recording and simulate the transport going away
/// while the sink itself is lent to a writer.
#[derive(Debug, Default)]
pub struct MemorySink {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Debug, Clone)]
pub struct MemorySinkHandle {
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MemorySinkHandle {
        MemorySinkHandle { shared: Arc::clone(&self.shared) }
    }

    fn commit(shared: &mut Shared) {
        if shared.recorded.committed_at.is_none() {
            shared.recorded.committed_at = Some(Instant::now());
        }
    }
}

impl MemorySinkHandle {
    pub fn recorded(&self) -> Recorded {
        lock(&self.shared).recorded.clone()
    }

    /// Simulates the peer going away. Emits [`SinkEvent::Closed`] every time it is called, like a
    /// socket reporting `close` even after the response finished.
    pub fn disconnect(&self) {
        let mut shared = lock(&self.shared);
        shared.closed = true;
        shared.recorded.events.push(SinkEvent::Closed);
        shared.listeners.emit(SinkEvent::Closed);
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    fn set_status(&mut self, status: StatusCode) {
        let mut shared = lock(&self.shared);
        if shared.recorded.committed_at.is_some() {
            warn!(%status, "status set after headers were committed, ignored");
            return;
        }
        shared.recorded.status = Some(status);
    }

    fn set_status_text(&mut self, text: &str) -> bool {
        let mut shared = lock(&self.shared);
        if shared.recorded.committed_at.is_some() || !StatusText::is_valid(text) {
            return false;
        }
        shared.recorded.status_text = Some(text.to_owned());
        true
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        let mut shared = lock(&self.shared);
        if shared.recorded.committed_at.is_some() {
            warn!(header = %name, "header appended after headers were committed, ignored");
            return;
        }
        shared.recorded.headers.push((name, value));
    }

    async fn flush_headers(&mut self) -> Result<(), SendError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(SendError::Closed);
        }
        Self::commit(&mut shared);
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SendError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            shared.recorded.writes_after_close += 1;
            return Err(SendError::Closed);
        }
        Self::commit(&mut shared);
        shared.recorded.chunks.push(chunk);
        shared.recorded.chunk_times.push(Instant::now());
        Ok(())
    }

    async fn end(&mut self) -> Result<(), SendError> {
        let mut shared = lock(&self.shared);
        if shared.closed {
            return Err(SendError::Closed);
        }
        Self::commit(&mut shared);
        shared.recorded.ended = true;
        shared.recorded.events.push(SinkEvent::Finished);
        shared.listeners.emit(SinkEvent::Finished);
        Ok(())
    }

    fn subscribe(&mut self, listener: LifecycleListener) {
        lock(&self.shared).listeners.push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn headers_are_frozen_after_first_write() {
        let mut sink = MemorySink::new();
        let handle = sink.handle();

        sink.set_status(StatusCode::OK);
        sink.append_header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        sink.write(Bytes::from_static(b"<html>")).await.unwrap();
        sink.append_header(http::header::VARY, HeaderValue::from_static("accept"));
        sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);

        let recorded = handle.recorded();
        assert_eq!(recorded.status, Some(StatusCode::OK));
        assert_eq!(recorded.headers.len(), 1);
        assert_eq!(recorded.body(), b"<html>");
    }

    #[tokio::test]
    async fn disconnect_rejects_writes_and_notifies() {
        let mut sink = MemorySink::new();
        let handle = sink.handle();
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        sink.subscribe(Box::new(move |event| {
            if event == SinkEvent::Closed {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        handle.disconnect();

        assert!(matches!(sink.write(Bytes::from_static(b"late")).await, Err(SendError::Closed)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(handle.recorded().writes_after_close, 1);
    }
}
