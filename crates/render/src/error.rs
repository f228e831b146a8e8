use std::time::Duration;

use micro_render_http::protocol::ParseError;
use micro_render_http::protocol::body::BoxError;
use thiserror::Error;

/// Failures of one render invocation.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("shell render failed: {source}")]
    Shell { source: BoxError },

    #[error("render did not reach a ready state within {deadline:?}")]
    DeadlineExceeded { deadline: Duration },

    #[error("client disconnected before the response was ready")]
    Disconnected,

    #[error("render aborted")]
    Aborted,
}

/// Failures crossing [`RenderAdapter::handle`](crate::RenderAdapter::handle); the caller answers
/// them with its own 5xx document.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("invalid request: {source}")]
    InvalidRequest {
        #[from]
        source: ParseError,
    },

    #[error("shell render failed: {source}")]
    ShellRender { source: BoxError },

    #[error("render did not reach a ready state within {deadline:?}")]
    DeadlineExceeded { deadline: Duration },
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("render engine must be set")]
    MissingEngine,
}
