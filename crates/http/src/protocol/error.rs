use std::io;
use thiserror::Error;

/// Failures while turning native request metadata into a canonical request.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http uri: {reason}")]
    InvalidUri { reason: String },

    #[error("request carries neither an origin nor a host header")]
    MissingHost,
}

impl ParseError {
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }
}

/// Failures while writing a response onto a native sink.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("the transport can no longer be written to")]
    Closed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether this error means the peer went away rather than something being wrong with the response.
    pub fn is_closed(&self) -> bool {
        match self {
            SendError::Closed => true,
            SendError::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            ),
            SendError::InvalidBody { .. } => false,
        }
    }
}

/// Failures of a lazily pulled byte sequence.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("body stream has already been consumed")]
    StreamAlreadyConsumed,

    #[error("byte emitter dropped before signalling the end of the stream")]
    EmitterGone,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
