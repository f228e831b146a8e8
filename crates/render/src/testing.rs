//! A scripted render engine for tests.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use micro_render_http::cancel::AbortSignal;
use micro_render_http::protocol::ResponseHead;
use micro_render_http::protocol::body::EmitterHandle;
use micro_render_http::request::CanonicalRequest;
use tokio::select;
use tokio::sync::oneshot;
use tracing::Level;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

use crate::classify::Strategy;
use crate::engine::{RenderCallbacks, RenderEngine, RenderHandle};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Sleep(u64),
    /// the ready callback of the chosen strategy
    Ready,
    ShellReady,
    AllReady,
    ShellError(&'static str),
    Error(&'static str),
    Chunk(&'static str),
    End,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct EngineLog {
    /// ready callbacks invoked, in order
    pub events: Vec<&'static str>,
    pub aborts: usize,
    /// the script noticed the abort signal and stopped early
    pub stopped: bool,
}

type HeadFn = Arc<dyn Fn(&mut ResponseHead) + Send + Sync>;

pub(crate) struct ScriptedEngine {
    script: Vec<Step>,
    log: Arc<Mutex<EngineLog>>,
    head: Option<HeadFn>,
}

impl ScriptedEngine {
    pub(crate) fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self { script: script.into_iter().collect(), log: Arc::default(), head: None }
    }

    pub(crate) fn with_head(mut self, head: impl Fn(&mut ResponseHead) + Send + Sync + 'static) -> Self {
        self.head = Some(Arc::new(head));
        self
    }

    pub(crate) fn log(&self) -> EngineLog {
        self.log.lock().unwrap().clone()
    }
}

struct ScriptedHandle {
    pipe: Mutex<Option<oneshot::Sender<EmitterHandle>>>,
    log: Arc<Mutex<EngineLog>>,
}

impl RenderHandle for ScriptedHandle {
    fn pipe(&self, pipe: EmitterHandle) {
        if let Some(sender) = self.pipe.lock().unwrap().take() {
            let _ = sender.send(pipe);
        }
    }

    fn abort(&self) {
        self.log.lock().unwrap().aborts += 1;
    }
}

impl RenderEngine for ScriptedEngine {
    type Document = str;

    fn render(
        &self,
        _request: &CanonicalRequest,
        _document: &str,
        callbacks: RenderCallbacks,
        signal: AbortSignal,
    ) -> Arc<dyn RenderHandle> {
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(run(self.script.clone(), callbacks, signal, receiver, Arc::clone(&self.log)));
        Arc::new(ScriptedHandle { pipe: Mutex::new(Some(sender)), log: Arc::clone(&self.log) })
    }

    fn initial_head(&self, _document: &str) -> ResponseHead {
        let mut head = ResponseHead::new(());
        if let Some(f) = &self.head {
            f(&mut head);
        }
        head
    }
}

async fn run(
    script: Vec<Step>,
    callbacks: RenderCallbacks,
    signal: AbortSignal,
    receiver: oneshot::Receiver<EmitterHandle>,
    log: Arc<Mutex<EngineLog>>,
) {
    let mut receiver = Some(receiver);
    let mut pipe: Option<EmitterHandle> = None;

    for step in script {
        if signal.is_aborted() {
            log.lock().unwrap().stopped = true;
            return;
        }

        match step {
            Step::Sleep(ms) => {
                select! {
                    () = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    _ = signal.aborted() => {
                        log.lock().unwrap().stopped = true;
                        return;
                    }
                }
            }
            Step::Ready => match callbacks.strategy() {
                Strategy::Agent => {
                    log.lock().unwrap().events.push("all_ready");
                    callbacks.all_ready();
                }
                Strategy::Interactive => {
                    log.lock().unwrap().events.push("shell_ready");
                    callbacks.shell_ready();
                }
            },
            Step::ShellReady => {
                log.lock().unwrap().events.push("shell_ready");
                callbacks.shell_ready();
            }
            Step::AllReady => {
                log.lock().unwrap().events.push("all_ready");
                callbacks.all_ready();
            }
            Step::ShellError(message) => callbacks.shell_error(message),
            Step::Error(message) => callbacks.error(message),
            Step::Chunk(text) => {
                if let Some(pipe) = piped(&mut receiver, &mut pipe).await {
                    pipe.data(text.as_bytes());
                }
            }
            Step::End => {
                if let Some(pipe) = piped(&mut receiver, &mut pipe).await {
                    pipe.end();
                }
            }
        }
    }
}

async fn piped<'a>(
    receiver: &mut Option<oneshot::Receiver<EmitterHandle>>,
    pipe: &'a mut Option<EmitterHandle>,
) -> Option<&'a EmitterHandle> {
    if let Some(receiver) = receiver.take() {
        *pipe = receiver.await.ok();
    }
    pipe.as_ref()
}

/// Log output of the current thread, captured for as long as the value lives.
pub(crate) struct CapturedLogs {
    output: LogBuffer,
    _guard: DefaultGuard,
}

impl CapturedLogs {
    pub(crate) fn install() -> Self {
        let output = LogBuffer::default();
        let subscriber = FmtSubscriber::builder()
            .with_writer(output.clone())
            .with_ansi(false)
            .with_max_level(Level::TRACE)
            .finish();
        Self { output, _guard: tracing::subscriber::set_default(subscriber) }
    }

    /// How many times `text` was logged.
    pub(crate) fn count(&self, text: &str) -> usize {
        String::from_utf8_lossy(&self.output.0.lock().unwrap()).matches(text).count()
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
