//! Drives one render invocation from start to a resolved response.
//!
//! Every invocation walks a small state machine:
//!
//! ```text
//! NotStarted -> Rendering -> ShellReady -> Streaming -> Completed
//!                   |             |            |
//!                   v             +-----+------+
//!               ShellError              v
//!                               StreamErrored
//! ```
//!
//! and any non-terminal phase may move to `Aborted` when the client disconnects, the deadline fires
//! or the response body is dropped. Transitions are applied atomically, the first one that fits the
//! current phase wins and everything arriving later is ignored.

use std::pin::Pin;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use micro_render_http::cancel::{AbortReason, AbortSignal, CancellationToken};
use micro_render_http::protocol::BodyError;
use micro_render_http::protocol::body::{BoxError, ByteEmitter, EmitterHandle, LazyBody, ResponseBody, from_push};
use micro_render_http::request::CanonicalRequest;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::classify::Strategy;
use crate::config::RenderConfig;
use crate::engine::{RenderCallbacks, RenderEngine, RenderHandle};
use crate::error::RenderError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderPhase {
    NotStarted,
    Rendering,
    ShellReady,
    ShellError,
    Streaming,
    StreamErrored,
    /// the body was fully drained
    Completed,
    Aborted,
}

impl RenderPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderPhase::ShellError | RenderPhase::StreamErrored | RenderPhase::Completed | RenderPhase::Aborted
        )
    }
}

/// A callback invocation coming from the engine.
#[derive(Debug)]
pub enum RenderEvent {
    ShellReady,
    AllReady,
    ShellError(BoxError),
    Error(BoxError),
}

/// The phase `event` moves a render in `phase` to, `None` when the event is ignored.
///
/// Only the ready event matching `strategy` resolves the shell. Errors before the shell leave the
/// phase alone, they are held until the shell either resolves or fails.
pub fn transition(phase: RenderPhase, strategy: Strategy, event: &RenderEvent) -> Option<RenderPhase> {
    match (phase, event) {
        (RenderPhase::Rendering, RenderEvent::ShellReady) if strategy == Strategy::Interactive => {
            Some(RenderPhase::ShellReady)
        }
        (RenderPhase::Rendering, RenderEvent::AllReady) if strategy == Strategy::Agent => Some(RenderPhase::ShellReady),
        (RenderPhase::Rendering, RenderEvent::ShellError(_)) => Some(RenderPhase::ShellError),
        (RenderPhase::ShellReady | RenderPhase::Streaming, RenderEvent::Error(_)) => Some(RenderPhase::StreamErrored),
        _ => None,
    }
}

enum Resolved {
    Shell(ByteEmitter),
    ShellError(BoxError),
}

pub(crate) struct RenderShared {
    strategy: Strategy,
    phase: watch::Sender<RenderPhase>,
    /// what the render reports as its status; the committed one may already be on the wire
    status: AtomicU16,
    resolved: mpsc::UnboundedSender<Resolved>,
    /// errors reported before the shell resolved
    pending: Mutex<Vec<BoxError>>,
    pipe: EmitterHandle,
    body: Mutex<Option<ByteEmitter>>,
}

impl RenderShared {
    pub(crate) fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn phase(&self) -> RenderPhase {
        *self.phase.borrow()
    }

    /// Applies `next` to the current phase atomically, returns whether the phase changed.
    fn advance<F>(&self, next: F) -> bool
    where
        F: FnOnce(RenderPhase) -> Option<RenderPhase>,
    {
        self.phase.send_if_modified(|phase| match next(*phase) {
            Some(next) => {
                trace!(from = ?*phase, to = ?next, "render phase changed");
                *phase = next;
                true
            }
            None => false,
        })
    }

    pub(crate) fn dispatch(&self, event: RenderEvent) {
        let mut event = Some(event);
        let changed = self.advance(|phase| {
            let next = event.as_ref().and_then(|event| transition(phase, self.strategy, event));
            if next.is_none() && phase == RenderPhase::Rendering {
                let held = event.take_if(|event| matches!(event, RenderEvent::Error(_)));
                if let Some(RenderEvent::Error(source)) = held {
                    self.hold(source);
                }
            }
            next
        });
        let Some(event) = event else {
            trace!("render error held until the shell resolves");
            return;
        };
        if !changed {
            trace!(?event, phase = ?self.phase(), strategy = ?self.strategy, "render event ignored");
            return;
        }

        match event {
            RenderEvent::ShellReady | RenderEvent::AllReady => {
                for source in self.take_pending() {
                    error!(cause = %source, "render failed before the shell was sent");
                }
                let body = self.body.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(body) = body {
                    let _ = self.resolved.send(Resolved::Shell(body));
                }
            }
            RenderEvent::ShellError(source) => {
                // the rejection reports the failure, earlier errors go with it
                let dropped = self.take_pending().len();
                if dropped > 0 {
                    trace!(dropped, "errors superseded by the shell error");
                }
                let _ = self.resolved.send(Resolved::ShellError(source));
            }
            RenderEvent::Error(source) => {
                // headers may be committed already, the status is only reported
                self.status.store(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), Ordering::Release);
                error!(cause = %source, "render failed after the shell was sent");
                self.pipe.end();
            }
        }
    }

    /// Keeps an error reported before the shell resolved; the status is failed right away.
    fn hold(&self, source: BoxError) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).push(source);
        self.status.store(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), Ordering::Release);
    }

    fn take_pending(&self) -> Vec<BoxError> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn begin_streaming(&self) {
        self.advance(|phase| (phase == RenderPhase::ShellReady).then_some(RenderPhase::Streaming));
    }

    fn complete(&self) {
        self.advance(|phase| {
            matches!(phase, RenderPhase::ShellReady | RenderPhase::Streaming).then_some(RenderPhase::Completed)
        });
    }

    fn abort(&self) -> bool {
        self.advance(|phase| (!phase.is_terminal()).then_some(RenderPhase::Aborted))
    }
}

/// Observes a render after its response was handed out.
#[derive(Clone)]
pub struct RenderReport {
    shared: Arc<RenderShared>,
}

impl RenderReport {
    pub fn phase(&self) -> RenderPhase {
        self.shared.phase()
    }

    /// The logical status of the render, `500` once an error was reported.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.shared.status.load(Ordering::Acquire)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn strategy(&self) -> Strategy {
        self.shared.strategy
    }

    /// Resolves once the render reached a terminal phase.
    pub async fn settled(&self) -> RenderPhase {
        let mut phase = self.shared.phase.subscribe();
        let settled = phase.wait_for(RenderPhase::is_terminal).await.map(|phase| *phase);
        settled.unwrap_or_else(|_| self.phase())
    }
}

impl std::fmt::Debug for RenderReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderReport")
            .field("phase", &self.phase())
            .field("status", &self.status())
            .field("strategy", &self.strategy())
            .finish()
    }
}

#[derive(Clone)]
struct RenderControl {
    shared: Arc<RenderShared>,
    token: CancellationToken,
    engine: Arc<dyn RenderHandle>,
}

impl RenderControl {
    fn abort(&self, reason: AbortReason) {
        if !self.shared.abort() {
            return;
        }
        match reason {
            AbortReason::DeadlineExceeded => warn!(?reason, "aborting render"),
            AbortReason::Disconnected | AbortReason::Requested => debug!(?reason, "aborting render"),
        }
        for source in self.shared.take_pending() {
            error!(cause = %source, "render failed before the shell was sent");
        }
        self.token.abort(reason);
        self.engine.abort();
        self.shared.pipe.end();
    }
}

/// Aborts the supervising task once the render no longer needs it.
struct SupervisorGuard(JoinHandle<()>);

impl Drop for SupervisorGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn supervise(control: RenderControl, request: AbortSignal, deadline: Instant) -> SupervisorGuard {
    let mut phase = control.shared.phase.subscribe();
    let handle = tokio::spawn(async move {
        let reason = select! {
            () = settled(&mut phase) => return,
            reason = request.aborted() => reason,
            () = tokio::time::sleep_until(deadline) => AbortReason::DeadlineExceeded,
        };
        control.abort(reason);
    });
    SupervisorGuard(handle)
}

async fn settled(phase: &mut watch::Receiver<RenderPhase>) {
    let _ = phase.wait_for(RenderPhase::is_terminal).await;
}

/// The streamed markup of a resolved render.
///
/// Draining it completes the render, dropping it early aborts the render.
struct RenderBody {
    inner: LazyBody,
    control: RenderControl,
    request: AbortSignal,
    drained: bool,
    _supervisor: SupervisorGuard,
}

impl Body for RenderBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(None) = polled {
            if !this.drained {
                this.drained = true;
                this.control.shared.complete();
                this.control.token.finish();
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for RenderBody {
    fn drop(&mut self) {
        if !self.drained {
            self.control.abort(self.request.reason().unwrap_or(AbortReason::Requested));
        }
    }
}

/// Runs renders under a wall clock budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator {
    config: RenderConfig,
}

impl Orchestrator {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Starts `engine` for `request` and waits until the response can be resolved.
    ///
    /// Resolves with a `text/html` response whose body streams the markup once the ready event of
    /// `strategy` fired, or fails on a shell error, a deadline hit or a client that went away first.
    /// The deadline keeps running while the body streams.
    pub async fn render<E>(
        &self,
        engine: &E,
        request: &CanonicalRequest,
        document: &E::Document,
        strategy: Strategy,
    ) -> Result<(Response<ResponseBody>, RenderReport), RenderError>
    where
        E: RenderEngine + ?Sized,
    {
        let abort_delay = self.config.abort_delay();
        let deadline = Instant::now() + abort_delay;

        let (pipe, body) = ByteEmitter::channel();
        let (resolved, mut resolution) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(RenderPhase::NotStarted);
        let shared = Arc::new(RenderShared {
            strategy,
            phase,
            status: AtomicU16::new(StatusCode::OK.as_u16()),
            resolved,
            pending: Mutex::default(),
            pipe,
            body: Mutex::new(Some(body)),
        });

        let token = CancellationToken::new();
        let signal = token.signal();

        shared.advance(|phase| (phase == RenderPhase::NotStarted).then_some(RenderPhase::Rendering));
        debug!(?strategy, uri = %request.uri(), ?abort_delay, "render started");
        let engine_handle = engine.render(request, document, RenderCallbacks::new(Arc::clone(&shared)), token.signal());

        let control = RenderControl { shared: Arc::clone(&shared), token, engine: engine_handle };
        let supervisor = supervise(control.clone(), request.signal().clone(), deadline);

        let resolved = select! {
            biased;
            Some(resolved) = resolution.recv() => resolved,
            reason = signal.aborted() => {
                return Err(match reason {
                    AbortReason::DeadlineExceeded => RenderError::DeadlineExceeded { deadline: abort_delay },
                    AbortReason::Disconnected => RenderError::Disconnected,
                    AbortReason::Requested => RenderError::Aborted,
                });
            }
        };

        let body = match resolved {
            Resolved::Shell(body) => body,
            Resolved::ShellError(source) => {
                control.token.abort(AbortReason::Requested);
                return Err(RenderError::Shell { source });
            }
        };

        let mut head = engine.initial_head(document);
        head.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        if shared.status.load(Ordering::Acquire) == StatusCode::INTERNAL_SERVER_ERROR.as_u16() {
            // nothing is committed yet, so the head can still carry the failure
            *head.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
        let (parts, ()) = head.into_parts();

        control.engine.pipe(shared.pipe.clone());
        shared.begin_streaming();
        trace!(?strategy, "render resolved, streaming markup");

        let body = RenderBody {
            inner: from_push(body),
            control,
            request: request.signal().clone(),
            drained: false,
            _supervisor: supervisor,
        };
        let report = RenderReport { shared };
        Ok((Response::from_parts(parts, ResponseBody::stream(body)), report))
    }

    /// Deadline of renders started by this orchestrator.
    pub fn abort_delay(&self) -> Duration {
        self.config.abort_delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CapturedLogs, ScriptedEngine, Step};
    use http::Method;
    use http_body_util::BodyExt;
    use micro_render_http::request::{NativeRequest, materialize};
    use micro_render_http::sink::MemorySink;

    fn request() -> (CanonicalRequest, CancellationToken, MemorySink) {
        let mut sink = MemorySink::new();
        let native = NativeRequest::new(Method::GET, "/").header("host", "example.com");
        let (request, token) = materialize(native, &mut sink).unwrap();
        (request, token, sink)
    }

    #[test]
    fn transition_table() {
        use RenderPhase::*;
        let shell = RenderEvent::ShellReady;
        let all = RenderEvent::AllReady;

        assert_eq!(transition(Rendering, Strategy::Interactive, &shell), Some(ShellReady));
        assert_eq!(transition(Rendering, Strategy::Interactive, &all), None);
        assert_eq!(transition(Rendering, Strategy::Agent, &all), Some(ShellReady));
        assert_eq!(transition(Rendering, Strategy::Agent, &shell), None);

        assert_eq!(transition(Rendering, Strategy::Agent, &RenderEvent::ShellError("x".into())), Some(ShellError));
        assert_eq!(transition(Rendering, Strategy::Agent, &RenderEvent::Error("x".into())), None);
        assert_eq!(transition(Streaming, Strategy::Agent, &RenderEvent::Error("x".into())), Some(StreamErrored));
        assert_eq!(transition(ShellReady, Strategy::Agent, &RenderEvent::ShellError("x".into())), None);

        for phase in [ShellError, StreamErrored, Completed, Aborted] {
            assert!(phase.is_terminal());
            assert_eq!(transition(phase, Strategy::Interactive, &shell), None);
            assert_eq!(transition(phase, Strategy::Interactive, &RenderEvent::Error("x".into())), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_html_response() {
        let engine =
            ScriptedEngine::new([Step::Sleep(3), Step::Ready, Step::Chunk("<p>"), Step::Chunk("</p>"), Step::End]);
        let (request, _token, _sink) = request();

        let orchestrator = Orchestrator::default();
        let (response, report) = orchestrator.render(&engine, &request, "doc", Strategy::Interactive).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
        assert_eq!(report.phase(), RenderPhase::Streaming);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<p></p>");
        assert_eq!(report.phase(), RenderPhase::Completed);
        assert_eq!(report.status(), StatusCode::OK);
        assert_eq!(engine.log().events, vec!["shell_ready"]);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_head_is_kept() {
        let engine = ScriptedEngine::new([Step::Ready, Step::End])
            .with_head(|head| {
                *head.status_mut() = StatusCode::NOT_FOUND;
                head.headers_mut().insert("x-render", HeaderValue::from_static("1"));
            });
        let (request, _token, _sink) = request();

        let orchestrator = Orchestrator::default();
        let (response, _report) = orchestrator.render(&engine, &request, "doc", Strategy::Agent).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-render"], "1");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
    }

    #[tokio::test(start_paused = true)]
    async fn error_before_ready_fails_the_response() {
        let logs = CapturedLogs::install();
        let engine = ScriptedEngine::new([
            Step::Error("suspense boundary failed"),
            Step::Ready,
            Step::Chunk("<html></html>"),
            Step::End,
        ]);
        let (request, _token, _sink) = request();

        let orchestrator = Orchestrator::default();
        let (response, report) = orchestrator.render(&engine, &request, "doc", Strategy::Agent).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(report.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"<html></html>");
        assert_eq!(report.phase(), RenderPhase::Completed);
        assert_eq!(logs.count("render failed before the shell was sent"), 1);
        assert_eq!(logs.count("suspense boundary failed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn error_before_deadline_is_logged_once() {
        let logs = CapturedLogs::install();
        let engine = ScriptedEngine::new([Step::Error("data source down"), Step::Sleep(60_000), Step::Ready]);
        let (request, _token, _sink) = request();
        let orchestrator = Orchestrator::new(RenderConfig::new().with_abort_delay(Duration::from_millis(100)));

        let error = orchestrator.render(&engine, &request, "doc", Strategy::Agent).await.unwrap_err();

        assert!(matches!(error, RenderError::DeadlineExceeded { .. }));
        assert_eq!(logs.count("data source down"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shell_error_rejects() {
        let logs = CapturedLogs::install();
        let engine = ScriptedEngine::new([Step::Error("boundary lost early"), Step::ShellError("boom"), Step::Ready]);
        let (request, _token, _sink) = request();

        let error = Orchestrator::default().render(&engine, &request, "doc", Strategy::Interactive).await.unwrap_err();

        match error {
            RenderError::Shell { source } => assert_eq!(source.to_string(), "boom"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(logs.count("boundary lost early"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_before_shell() {
        let engine = ScriptedEngine::new([Step::Sleep(60_000), Step::Ready, Step::End]);
        let (request, _token, _sink) = request();
        let orchestrator = Orchestrator::new(RenderConfig::new().with_abort_delay(Duration::from_millis(250)));

        let start = Instant::now();
        let error = orchestrator.render(&engine, &request, "doc", Strategy::Interactive).await.unwrap_err();

        assert!(matches!(error, RenderError::DeadlineExceeded { deadline } if deadline == Duration::from_millis(250)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");

        tokio::time::sleep(Duration::from_millis(1)).await;
        let log = engine.log();
        assert_eq!(log.aborts, 1);
        assert!(log.events.is_empty());
        assert!(log.stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_before_shell() {
        let engine = ScriptedEngine::new([Step::Sleep(100), Step::Ready, Step::End]);
        let (request, token, _sink) = request();

        let disconnect = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.abort(AbortReason::Disconnected);
        };
        let orchestrator = Orchestrator::default();
        let (result, ()) =
            tokio::join!(orchestrator.render(&engine, &request, "doc", Strategy::Interactive), disconnect);

        assert!(matches!(result, Err(RenderError::Disconnected)));
        assert_eq!(engine.log().aborts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_truncates() {
        let engine = ScriptedEngine::new([
            Step::Ready,
            Step::Chunk("<html>"),
            Step::Error("lost"),
            Step::Chunk("late"),
            Step::End,
        ]);
        let (request, _token, _sink) = request();

        let (response, report) =
            Orchestrator::default().render(&engine, &request, "doc", Strategy::Interactive).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        assert_eq!(&body[..], b"<html>");
        assert_eq!(report.phase(), RenderPhase::StreamErrored);
        assert_eq!(report.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_body_aborts() {
        let engine = ScriptedEngine::new([Step::Ready, Step::Chunk("<html>"), Step::Sleep(1_000), Step::End]);
        let (request, _token, _sink) = request();

        let (response, report) =
            Orchestrator::default().render(&engine, &request, "doc", Strategy::Interactive).await.unwrap();
        drop(response);

        assert_eq!(report.phase(), RenderPhase::Aborted);
        tokio::time::sleep(Duration::from_millis(1)).await;
        let log = engine.log();
        assert_eq!(log.aborts, 1);
        assert_eq!(log.events, vec!["shell_ready"]);
        assert!(log.stopped);
    }
}
