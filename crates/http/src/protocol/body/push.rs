use std::fmt::Display;
use std::pin::pin;

use bytes::Bytes;
use http_body::Body;
use http_body_util::BodyExt;
use tokio::select;
use tracing::{debug, error, trace};

use crate::cancel::AbortSignal;
use crate::protocol::SendError;
use crate::sink::ResponseSink;

/// How draining a body into a sink ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// every chunk was written
    Completed,
    /// the signal fired or the sink went away before the body was exhausted
    Aborted,
}

/// Drains `body` into `sink` one chunk at a time.
///
/// The next chunk is only pulled after the sink accepted the previous one. Once `signal` is aborted
/// no further chunk is pulled or written. Completing the sink is left to the caller.
pub async fn to_push<B, S>(body: B, sink: &mut S, signal: &AbortSignal) -> Result<PushOutcome, SendError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
    S: ResponseSink + ?Sized,
{
    let mut body = pin!(body);
    let mut written = 0usize;

    loop {
        let frame = select! {
            biased;
            reason = signal.aborted() => {
                debug!(?reason, written, "stop draining body, request aborted");
                return Ok(PushOutcome::Aborted);
            }
            frame = body.frame() => frame,
        };

        let data = match frame {
            None => {
                trace!(written, "body drained");
                return Ok(PushOutcome::Completed);
            }
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => data,
                Err(_trailers) => {
                    debug!("dropping non-data frame");
                    continue;
                }
            },
            Some(Err(e)) => {
                error!(cause = %e, written, "failed to pull response body");
                return Err(SendError::invalid_body(format!("resolve response body error: {e}")));
            }
        };

        // the frame may have raced with an abort
        if signal.is_aborted() {
            return Ok(PushOutcome::Aborted);
        }

        written += data.len();
        match sink.write(data).await {
            Ok(()) => {}
            Err(e) if e.is_closed() => {
                debug!(cause = %e, written, "transport closed while writing body");
                return Ok(PushOutcome::Aborted);
            }
            Err(e) => return Err(e),
        }
    }
}
