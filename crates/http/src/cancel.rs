//! Per-request cancellation.
//!
//! A [`CancellationToken`] starts `Active` and reaches exactly one terminal state: `Finished` once
//! the response has been fully handed to the transport, or `Aborted` when the connection can no
//! longer be written to (or a deadline fired) before that. The first transition wins, every later
//! attempt is a no-op.
//!
//! Holders of an [`AbortSignal`] observe the state level-triggered: a signal checked after the
//! token aborted always reports it, no matter when the check happens.

use std::future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::sink::{ResponseSink, SinkEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// the transport reported it can no longer be written to
    Disconnected,
    DeadlineExceeded,
    /// aborted explicitly by the owner of the token
    Requested,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Finished,
    Aborted(AbortReason),
}

impl TokenState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TokenState::Active)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, TokenState::Aborted(_))
    }
}

/// Writer side of the per-request cancellation state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<TokenState>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TokenState::Active);
        Self { state: Arc::new(sender) }
    }

    pub fn state(&self) -> TokenState {
        *self.state.borrow()
    }

    /// Moves to `Finished`; returns whether this call made the transition.
    pub fn finish(&self) -> bool {
        self.transition(TokenState::Finished)
    }

    /// Moves to `Aborted`; returns whether this call made the transition.
    pub fn abort(&self, reason: AbortReason) -> bool {
        self.transition(TokenState::Aborted(reason))
    }

    fn transition(&self, next: TokenState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = next;
            true
        })
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal { state: self.state.subscribe() }
    }

    /// Ties the token to a sink: `Closed` aborts it, `Finished` finishes it, whichever comes first.
    pub fn bind<S>(&self, sink: &mut S)
    where
        S: ResponseSink + ?Sized,
    {
        let token = self.clone();
        sink.subscribe(Box::new(move |event| match event {
            SinkEvent::Closed => {
                if token.abort(AbortReason::Disconnected) {
                    debug!("transport closed before the response finished");
                }
            }
            SinkEvent::Finished => {
                token.finish();
            }
        }));
    }
}

/// Read side of a [`CancellationToken`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: watch::Receiver<TokenState>,
}

impl AbortSignal {
    pub fn state(&self) -> TokenState {
        *self.state.borrow()
    }

    pub fn is_aborted(&self) -> bool {
        self.state().is_aborted()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        match self.state() {
            TokenState::Aborted(reason) => Some(reason),
            TokenState::Active | TokenState::Finished => None,
        }
    }

    /// Resolves with the reason once the token is aborted, immediately if it already is.
    ///
    /// Never resolves for a token that finished or was dropped while active.
    pub async fn aborted(&self) -> AbortReason {
        match self.settled().await {
            TokenState::Aborted(reason) => reason,
            TokenState::Active | TokenState::Finished => future::pending().await,
        }
    }

    /// Resolves with the terminal state once the token reached one.
    pub async fn settled(&self) -> TokenState {
        let mut state = self.state.clone();
        let settled = state.wait_for(TokenState::is_terminal).await.map(|state| *state);
        match settled {
            Ok(state) => state,
            // token dropped while active, nothing can settle it anymore
            Err(_) => future::pending().await,
        }
    }
}
