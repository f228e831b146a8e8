//! Native response sinks.
//!
//! A [`ResponseSink`] is the push-style side of a host transport: status and headers are set
//! synchronously, body bytes are written one chunk at a time, and the transport reports its
//! lifecycle through [`SinkEvent`]s.
//!
//! Two sinks ship with the crate:
//!
//! - [`WireSink`]: serializes an HTTP/1.1 response onto any tokio `AsyncWrite`
//! - [`MemorySink`]: records everything written to it, with a handle to simulate disconnects

mod memory;
mod wire;

pub use memory::MemorySink;
pub use memory::MemorySinkHandle;
pub use memory::Recorded;
pub use wire::WireSink;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};

use crate::protocol::SendError;

/// Lifecycle notifications emitted by a sink.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The connection can no longer be written to.
    Closed,
    /// The whole response has been handed to the transport.
    Finished,
}

pub type LifecycleListener = Box<dyn Fn(SinkEvent) + Send + Sync>;

#[async_trait]
pub trait ResponseSink: Send {
    fn set_status(&mut self, status: StatusCode);

    /// Sets the reason phrase; returns false if the sink can't express one.
    fn set_status_text(&mut self, _text: &str) -> bool {
        false
    }

    /// Appends one header line. Headers appended after they were committed are dropped.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Commits status and headers to the transport right away instead of with the first chunk.
    async fn flush_headers(&mut self) -> Result<(), SendError>;

    /// Writes one body chunk; resolves once the transport accepted it.
    async fn write(&mut self, chunk: Bytes) -> Result<(), SendError>;

    /// Completes the response.
    async fn end(&mut self) -> Result<(), SendError>;

    /// Registers a listener for [`SinkEvent`]s.
    fn subscribe(&mut self, listener: LifecycleListener);
}

/// Fan-out of lifecycle events to every subscribed listener.
#[derive(Default)]
pub(crate) struct Listeners {
    inner: Vec<LifecycleListener>,
}

impl Listeners {
    pub(crate) fn push(&mut self, listener: LifecycleListener) {
        self.inner.push(listener);
    }

    pub(crate) fn emit(&self, event: SinkEvent) {
        for listener in &self.inner {
            listener(event);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.inner.len()).finish()
    }
}
