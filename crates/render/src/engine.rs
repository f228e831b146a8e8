//! The contract between the orchestrator and a progressive HTML render engine.

use std::sync::Arc;

use micro_render_http::cancel::AbortSignal;
use micro_render_http::protocol::ResponseHead;
use micro_render_http::protocol::body::{BoxError, EmitterHandle};
use micro_render_http::request::CanonicalRequest;

use crate::classify::Strategy;
use crate::orchestrator::{RenderEvent, RenderShared};

/// A render engine producing HTML progressively.
///
/// `render` starts one invocation and reports progress through the [`RenderCallbacks`]: exactly one
/// ready event (the shell for interactive clients, all content for agents), or a shell error before
/// it, and any number of errors after it. Markup flows once the orchestrator hands a pipe to the
/// returned [`RenderHandle`].
pub trait RenderEngine: Send + Sync {
    type Document: ?Sized + Sync;

    fn render(
        &self,
        request: &CanonicalRequest,
        document: &Self::Document,
        callbacks: RenderCallbacks,
        signal: AbortSignal,
    ) -> Arc<dyn RenderHandle>;

    /// Status and headers the response starts from once the shell resolves.
    fn initial_head(&self, _document: &Self::Document) -> ResponseHead {
        ResponseHead::new(())
    }
}

/// One running render invocation.
pub trait RenderHandle: Send + Sync {
    /// Starts writing markup into `pipe`; called at most once, after the ready event.
    fn pipe(&self, pipe: EmitterHandle);

    /// Tears the render down. May be called more than once.
    fn abort(&self);
}

/// Completion callbacks handed to the engine for one invocation.
///
/// Events that don't fit the current phase of the render are ignored, so the ready callback of the
/// strategy that wasn't chosen never resolves anything.
#[derive(Clone)]
pub struct RenderCallbacks {
    shared: Arc<RenderShared>,
}

impl RenderCallbacks {
    pub(crate) fn new(shared: Arc<RenderShared>) -> Self {
        Self { shared }
    }

    pub fn strategy(&self) -> Strategy {
        self.shared.strategy()
    }

    /// The initial shell markup is ready.
    pub fn shell_ready(&self) {
        self.shared.dispatch(RenderEvent::ShellReady);
    }

    /// Every suspended boundary resolved, the document is complete.
    pub fn all_ready(&self) {
        self.shared.dispatch(RenderEvent::AllReady);
    }

    /// The shell could not be rendered.
    pub fn shell_error(&self, error: impl Into<BoxError>) {
        self.shared.dispatch(RenderEvent::ShellError(error.into()));
    }

    /// A non-fatal render fault.
    pub fn error(&self, error: impl Into<BoxError>) {
        self.shared.dispatch(RenderEvent::Error(error.into()));
    }
}

impl std::fmt::Debug for RenderCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCallbacks").field("strategy", &self.strategy()).finish()
    }
}
