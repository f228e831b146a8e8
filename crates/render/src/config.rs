use std::time::Duration;

/// How long a render may run before it is torn down, unless configured otherwise.
pub const DEFAULT_ABORT_DELAY: Duration = Duration::from_millis(5000);

/// Per-adapter render settings, handed to every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    abort_delay: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { abort_delay: DEFAULT_ABORT_DELAY }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall clock budget of one render, measured from invocation start.
    pub fn abort_delay(&self) -> Duration {
        self.abort_delay
    }

    pub fn with_abort_delay(mut self, abort_delay: Duration) -> Self {
        self.abort_delay = abort_delay;
        self
    }
}
