use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::protocol::{BodyError, PayloadItem};

pub(crate) type EmitterEvent = Result<PayloadItem, BodyError>;

/// The producing side of a push-style byte stream.
///
/// Emitting never waits: events are queued until the consumer pulls them. Once [`end`](Self::end)
/// or [`fail`](Self::fail) has been called the stream is closed for every clone of the handle and
/// later emissions are dropped.
#[derive(Debug, Clone)]
pub struct EmitterHandle {
    sender: mpsc::UnboundedSender<EmitterEvent>,
}

/// The consuming side of a push-style byte stream, turned into a body by
/// [`from_push`](super::from_push).
#[derive(Debug)]
pub struct ByteEmitter {
    pub(crate) receiver: mpsc::UnboundedReceiver<EmitterEvent>,
}

impl ByteEmitter {
    pub fn channel() -> (EmitterHandle, ByteEmitter) {
        let (sender, receiver) = mpsc::unbounded();
        (EmitterHandle { sender }, ByteEmitter { receiver })
    }

    /// An emitter that has already ended without emitting anything.
    pub fn empty() -> ByteEmitter {
        let (handle, emitter) = Self::channel();
        handle.end();
        emitter
    }
}

impl EmitterHandle {
    /// Emits a copy of `chunk`; the caller keeps ownership of its buffer and may reuse it.
    ///
    /// Returns false when the stream is already closed or nobody listens anymore.
    pub fn data(&self, chunk: &[u8]) -> bool {
        self.data_bytes(Bytes::copy_from_slice(chunk))
    }

    /// Emits a chunk the caller already owns exclusively.
    pub fn data_bytes(&self, chunk: Bytes) -> bool {
        self.sender.unbounded_send(Ok(PayloadItem::Chunk(chunk))).is_ok()
    }

    pub fn end(&self) {
        if self.sender.unbounded_send(Ok(PayloadItem::Eof)).is_ok() {
            trace!("byte emitter ended");
        }
        self.sender.close_channel();
    }

    pub fn fail(&self, error: io::Error) {
        let _ = self.sender.unbounded_send(Err(BodyError::from(error)));
        self.sender.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Pushes everything read from `reader` into `handle`, one data event per read, then ends it.
///
/// The read buffer is reused between reads, every emitted chunk is an independent copy.
pub async fn pump_reader<R>(mut reader: R, handle: EmitterHandle) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut total = 0u64;
    loop {
        buf.clear();
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                handle.end();
                return Ok(total);
            }
            Ok(n) => {
                total += n as u64;
                if !handle.data(&buf[..n]) {
                    debug!(read = total, "body consumer went away, stop reading");
                    return Ok(total);
                }
            }
            Err(e) => {
                debug!(cause = %e, "failed to read request body from transport");
                let kind = e.kind();
                handle.fail(e);
                return Err(io::Error::from(kind));
            }
        }
    }
}
