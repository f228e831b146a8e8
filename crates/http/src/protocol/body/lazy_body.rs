use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use http_body::{Body, Frame};
use tracing::trace;

use super::emitter::{ByteEmitter, EmitterEvent};
use crate::protocol::{BodyError, PayloadItem};

/// Wraps a push-style emitter as a pull-style body.
pub fn from_push(emitter: ByteEmitter) -> LazyBody {
    LazyBody { state: State::Idle(emitter) }
}

/// A forward-only byte sequence pulled on demand from a [`ByteEmitter`].
///
/// Each data event becomes exactly one frame, in emission order and without coalescing. The end
/// event completes the body without a trailing frame.
#[derive(Debug)]
pub struct LazyBody {
    state: State,
}

#[derive(Debug)]
enum State {
    /// not pulled yet
    Idle(ByteEmitter),
    Subscribed(mpsc::UnboundedReceiver<EmitterEvent>),
    Done,
}

impl Body for LazyBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if matches!(this.state, State::Idle(_)) {
            if let State::Idle(emitter) = std::mem::replace(&mut this.state, State::Done) {
                trace!("subscribing to byte emitter");
                this.state = State::Subscribed(emitter.receiver);
            }
        }

        let State::Subscribed(receiver) = &mut this.state else {
            return Poll::Ready(None);
        };

        match ready!(receiver.poll_next_unpin(cx)) {
            Some(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Ok(PayloadItem::Eof)) => {
                this.state = State::Done;
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.state = State::Done;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.state = State::Done;
                Poll::Ready(Some(Err(BodyError::EmitterGone)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn chunks_pass_through_unmodified_and_in_order() {
        let (handle, emitter) = ByteEmitter::channel();
        let mut body = from_push(emitter);

        let mut reused = b"<html>".to_vec();
        handle.data(&reused);
        reused.copy_from_slice(b"XXXXXX");
        handle.data(b"</html>");
        handle.end();
        handle.data(b"ignored");

        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap(), "<html>");
        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap(), "</html>");
        assert!(body.frame().await.is_none());
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn dropped_emitter_is_an_error() {
        let (handle, emitter) = ByteEmitter::channel();
        let mut body = from_push(emitter);
        handle.data(b"partial");
        drop(handle);

        assert_eq!(body.frame().await.unwrap().unwrap().into_data().unwrap(), "partial");
        assert!(matches!(body.frame().await, Some(Err(BodyError::EmitterGone))));
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn pump_reader_emits_reads_then_ends() {
        let (handle, emitter) = ByteEmitter::channel();
        let reader: &[u8] = b"name=value&other=1";

        let pumped = super::super::pump_reader(reader, handle).await.unwrap();
        let collected = from_push(emitter).collect().await.unwrap().to_bytes();

        assert_eq!(pumped, 18);
        assert_eq!(collected, "name=value&other=1");
    }
}
