//! Streaming HTML renders served over [`micro_render_http`] transports.
//!
//! A [`RenderAdapter`] takes a native request and a response sink, starts a [`RenderEngine`] and
//! answers as soon as the render is ready for the requester: automated agents get the complete
//! document, interactive clients get the shell right away with the rest streamed behind it. The
//! render is torn down when the client goes away or the configured deadline passes, whichever
//! comes first.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use http::Method;
//! use micro_render::{RenderAdapter, RenderCallbacks, RenderEngine, RenderHandle};
//! use micro_render_http::cancel::AbortSignal;
//! use micro_render_http::protocol::body::EmitterHandle;
//! use micro_render_http::request::{CanonicalRequest, NativeRequest};
//! use micro_render_http::sink::WireSink;
//!
//! struct Static;
//! struct Page(&'static str);
//!
//! impl RenderHandle for Page {
//!     fn pipe(&self, pipe: EmitterHandle) {
//!         pipe.data(self.0.as_bytes());
//!         pipe.end();
//!     }
//!
//!     fn abort(&self) {}
//! }
//!
//! impl RenderEngine for Static {
//!     type Document = str;
//!
//!     fn render(
//!         &self,
//!         _: &CanonicalRequest,
//!         _: &str,
//!         callbacks: RenderCallbacks,
//!         _: AbortSignal,
//!     ) -> Arc<dyn RenderHandle> {
//!         callbacks.shell_ready();
//!         callbacks.all_ready();
//!         Arc::new(Page("<html><body>hello</body></html>"))
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = RenderAdapter::builder().engine(Static).abort_delay(Duration::from_secs(2)).build()?;
//! let native = NativeRequest::new(Method::GET, "/").header("host", "localhost:8080");
//! adapter.handle(native, &mut WireSink::new(tokio::io::stdout()), "index").await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod classify;
mod config;
mod engine;
mod error;
mod orchestrator;

#[cfg(test)]
mod testing;

pub use adapter::RenderAdapter;
pub use adapter::RenderAdapterBuilder;
pub use classify::AgentClassifier;
pub use classify::KnownAgents;
pub use classify::Strategy;
pub use config::DEFAULT_ABORT_DELAY;
pub use config::RenderConfig;
pub use engine::RenderCallbacks;
pub use engine::RenderEngine;
pub use engine::RenderHandle;
pub use error::BuildError;
pub use error::HandleError;
pub use error::RenderError;
pub use orchestrator::Orchestrator;
pub use orchestrator::RenderEvent;
pub use orchestrator::RenderPhase;
pub use orchestrator::RenderReport;
pub use orchestrator::transition;
