//! Writes a canonical response onto a native sink.

use std::fmt::Display;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Response};
use http_body::Body;
use tracing::debug;

use crate::cancel::AbortSignal;
use crate::protocol::body::{PushOutcome, to_push};
use crate::protocol::header::from_canonical;
use crate::protocol::{SendError, StatusText};
use crate::sink::ResponseSink;

/// Flushes `response` onto `sink`.
///
/// Status and status text go first, then every header line (folded `Set-Cookie` values are split),
/// then the body chunk by chunk, then completion. Event streams get their headers pushed out before
/// the first event. Nothing is written after `signal` aborts, and a sink that went away yields
/// [`PushOutcome::Aborted`] rather than an error.
pub async fn flush<B, S>(response: Response<B>, sink: &mut S, signal: &AbortSignal) -> Result<PushOutcome, SendError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
    S: ResponseSink + ?Sized,
{
    let (parts, body) = response.into_parts();

    sink.set_status(parts.status);
    if let Some(text) = parts.extensions.get::<StatusText>() {
        if !sink.set_status_text(text.as_str()) {
            debug!(status_text = text.as_str(), "sink can't carry a status text, dropped");
        }
    }

    from_canonical(&parts.headers, sink);

    if is_event_stream(&parts.headers) {
        if let Err(e) = sink.flush_headers().await {
            return closed_or(e);
        }
    }

    match to_push(body, sink, signal).await? {
        PushOutcome::Completed => {}
        PushOutcome::Aborted => return Ok(PushOutcome::Aborted),
    }

    if signal.is_aborted() {
        return Ok(PushOutcome::Aborted);
    }
    match sink.end().await {
        Ok(()) => Ok(PushOutcome::Completed),
        Err(e) => closed_or(e),
    }
}

fn closed_or(e: SendError) -> Result<PushOutcome, SendError> {
    if e.is_closed() {
        debug!(cause = %e, "transport closed while flushing response");
        return Ok(PushOutcome::Aborted);
    }
    Err(e)
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_some_and(|mime| mime.essence_str() == mime::TEXT_EVENT_STREAM.essence_str())
}
