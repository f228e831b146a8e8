use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderName, HeaderValue, StatusCode, header};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use super::{LifecycleListener, Listeners, ResponseSink, SinkEvent};
use crate::codec::ResponseEncoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError, StatusText};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum WireState {
    /// head still mutable, nothing on the wire yet
    Pending,
    Streaming,
    Ended,
    Closed,
}

/// Writes an HTTP/1.1 response onto a tokio writer.
///
/// The head is buffered until the first chunk, an explicit [`flush_headers`](ResponseSink::flush_headers)
/// or [`end`](ResponseSink::end). A head committed together with a body is framed with chunked transfer
/// coding unless the application declared a `Content-Length`.
pub struct WireSink<W> {
    writer: W,
    buffer: BytesMut,
    encoder: ResponseEncoder,
    head: ResponseHead,
    state: WireState,
    listeners: Listeners,
}

impl<W> WireSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, 8 * 1024)
    }

    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(buffer_size),
            encoder: ResponseEncoder::new(),
            head: ResponseHead::new(()),
            state: WireState::Pending,
            listeners: Listeners::default(),
        }
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn declared_length(&self) -> Option<u64> {
        self.head.headers().get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
    }

    fn encode<D: bytes::Buf>(&mut self, message: Message<(ResponseHead, PayloadSize), D>) -> Result<(), SendError> {
        self.encoder.encode(message, &mut self.buffer)
    }

    /// Moves the head into the output buffer, framing the payload as `payload_size` unless the
    /// application declared a length.
    fn commit(&mut self, payload_size: PayloadSize) -> Result<(), SendError> {
        if self.state != WireState::Pending {
            return Ok(());
        }
        let payload_size = match (payload_size, self.declared_length()) {
            (PayloadSize::Chunked, Some(length)) => PayloadSize::Length(length),
            (payload_size, _) => payload_size,
        };
        let head = std::mem::replace(&mut self.head, ResponseHead::new(()));
        self.encode(Message::<_, Bytes>::Header((head, payload_size)))?;
        self.state = WireState::Streaming;
        Ok(())
    }

    async fn flush_buffer(&mut self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let result = match self.writer.write_all(self.buffer.as_ref()).await {
            Ok(()) => self.writer.flush().await,
            Err(e) => Err(e),
        };
        self.buffer.clear();

        if let Err(e) = result {
            debug!(cause = %e, "transport write failed, marking sink closed");
            self.close();
            return Err(SendError::io(e));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.state != WireState::Closed {
            self.state = WireState::Closed;
            self.listeners.emit(SinkEvent::Closed);
        }
    }

    fn ensure_writable(&self) -> Result<(), SendError> {
        match self.state {
            WireState::Closed | WireState::Ended => Err(SendError::Closed),
            WireState::Pending | WireState::Streaming => Ok(()),
        }
    }
}

#[async_trait]
impl<W> ResponseSink for WireSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    fn set_status(&mut self, status: StatusCode) {
        if self.state != WireState::Pending {
            warn!(%status, "status set after headers were committed, ignored");
            return;
        }
        *self.head.status_mut() = status;
    }

    fn set_status_text(&mut self, text: &str) -> bool {
        if self.state != WireState::Pending {
            return false;
        }
        if !StatusText::is_valid(text) {
            warn!(status_text = ?text, "invalid reason phrase, ignored");
            return false;
        }
        self.head.extensions_mut().insert(StatusText::new(text.to_owned()));
        true
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.state != WireState::Pending {
            warn!(header = %name, "header appended after headers were committed, ignored");
            return;
        }
        self.head.headers_mut().append(name, value);
    }

    async fn flush_headers(&mut self) -> Result<(), SendError> {
        self.ensure_writable()?;
        self.commit(PayloadSize::Chunked)?;
        self.flush_buffer().await
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SendError> {
        self.ensure_writable()?;
        self.commit(PayloadSize::Chunked)?;
        self.encode(Message::Payload(PayloadItem::Chunk(chunk)))?;
        self.flush_buffer().await
    }

    async fn end(&mut self) -> Result<(), SendError> {
        self.ensure_writable()?;
        self.commit(PayloadSize::Empty)?;
        self.encode(Message::Payload(PayloadItem::<Bytes>::Eof))?;
        self.flush_buffer().await?;
        self.state = WireState::Ended;
        self.listeners.emit(SinkEvent::Finished);
        Ok(())
    }

    fn subscribe(&mut self, listener: LifecycleListener) {
        self.listeners.push(listener);
    }
}

impl<W> std::fmt::Debug for WireSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireSink").field("state", &self.state).field("buffered", &self.buffer.len()).finish()
    }
}
