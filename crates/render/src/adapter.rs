use std::time::Duration;

use micro_render_http::flush::flush;
use micro_render_http::protocol::body::PushOutcome;
use micro_render_http::request::{NativeRequest, materialize};
use micro_render_http::sink::ResponseSink;
use tracing::{debug, error, info};

use crate::classify::{AgentClassifier, KnownAgents, Strategy};
use crate::config::RenderConfig;
use crate::engine::RenderEngine;
use crate::error::{BuildError, HandleError, RenderError};
use crate::orchestrator::{Orchestrator, RenderReport};

pub struct RenderAdapterBuilder<E> {
    engine: Option<E>,
    classifier: Option<Box<dyn AgentClassifier>>,
    config: RenderConfig,
}

impl<E: RenderEngine> RenderAdapterBuilder<E> {
    fn new() -> Self {
        Self { engine: None, classifier: None, config: RenderConfig::default() }
    }

    pub fn engine(mut self, engine: E) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn classifier(mut self, classifier: impl AgentClassifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    pub fn abort_delay(mut self, abort_delay: Duration) -> Self {
        self.config = self.config.with_abort_delay(abort_delay);
        self
    }

    pub fn config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<RenderAdapter<E>, BuildError> {
        let engine = self.engine.ok_or(BuildError::MissingEngine)?;
        let classifier = self.classifier.unwrap_or_else(|| Box::new(KnownAgents::default()));
        Ok(RenderAdapter { engine, classifier, orchestrator: Orchestrator::new(self.config) })
    }
}

/// Serves native requests with a streaming render engine.
///
/// One adapter is shared by every request; each call to [`handle`](Self::handle) runs an
/// independent render.
pub struct RenderAdapter<E> {
    engine: E,
    classifier: Box<dyn AgentClassifier>,
    orchestrator: Orchestrator,
}

impl<E: RenderEngine> RenderAdapter<E> {
    pub fn builder() -> RenderAdapterBuilder<E> {
        RenderAdapterBuilder::new()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &RenderConfig {
        self.orchestrator.config()
    }

    /// Renders `document` for `native` and writes the result onto `sink`.
    ///
    /// Resolves once the response was written or abandoned. Errors are returned only while nothing
    /// has been committed to `sink` yet, so the caller can still answer with its own error document.
    pub async fn handle<S>(
        &self,
        native: NativeRequest,
        sink: &mut S,
        document: &E::Document,
    ) -> Result<(), HandleError>
    where
        S: ResponseSink + ?Sized,
    {
        self.serve(native, sink, document).await.map(|_| ())
    }

    /// Like [`handle`](Self::handle), also returning the report of the render, `None` when the
    /// client went away before there was anything to send.
    pub async fn serve<S>(
        &self,
        native: NativeRequest,
        sink: &mut S,
        document: &E::Document,
    ) -> Result<Option<RenderReport>, HandleError>
    where
        S: ResponseSink + ?Sized,
    {
        let (request, token) = materialize(native, sink)?;
        let strategy = Strategy::for_user_agent(self.classifier.as_ref(), request.user_agent());

        let (response, report) = match self.orchestrator.render(&self.engine, &request, document, strategy).await {
            Ok(rendered) => rendered,
            Err(RenderError::Shell { source }) => {
                error!(cause = %source, uri = %request.uri(), "shell render failed");
                return Err(HandleError::ShellRender { source });
            }
            Err(RenderError::DeadlineExceeded { deadline }) => {
                error!(?deadline, uri = %request.uri(), "render did not become ready in time");
                return Err(HandleError::DeadlineExceeded { deadline });
            }
            Err(e @ (RenderError::Disconnected | RenderError::Aborted)) => {
                debug!(cause = %e, uri = %request.uri(), "nothing to send, render abandoned");
                return Ok(None);
            }
        };

        match flush(response, sink, request.signal()).await {
            Ok(PushOutcome::Completed) => {
                info!(status = %report.status(), ?strategy, uri = %request.uri(), "response sent");
            }
            Ok(PushOutcome::Aborted) => {
                debug!(state = ?token.state(), uri = %request.uri(), "response abandoned");
            }
            Err(e) => {
                error!(cause = %e, uri = %request.uri(), "failed to flush response");
            }
        }
        Ok(Some(report))
    }
}

impl<E> std::fmt::Debug for RenderAdapter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderAdapter").field("config", self.orchestrator.config()).finish_non_exhaustive()
    }
}

impl<E> std::fmt::Debug for RenderAdapterBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderAdapterBuilder")
            .field("engine", &self.engine.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
