//! Response head types.
//!
//! A response head is an `http::Response<()>`; the body is attached separately so the head can be
//! committed to the wire while the body is still streaming.

use http::Response;
use std::borrow::Cow;

/// Type alias for HTTP response headers before the body is attached.
pub type ResponseHead = Response<()>;

/// A custom reason phrase for the status line.
///
/// `http::Response` has no status text of its own, so it travels as a response extension. Sinks
/// that can't express a reason phrase ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText(Cow<'static, str>);

impl StatusText {
    pub fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `text` may appear as a reason phrase: tabs, spaces, visible ASCII and obs-text.
    pub fn is_valid(text: &str) -> bool {
        text.bytes().all(|b| b == b'\t' || b == b' ' || (0x21..=0x7e).contains(&b) || b >= 0x80)
    }
}

impl From<&'static str> for StatusText {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StatusText {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_phrase_charset() {
        assert!(StatusText::is_valid("Not Found"));
        assert!(StatusText::is_valid("Gone\taway"));
        assert!(StatusText::is_valid("Très bien"));
        assert!(StatusText::is_valid(""));

        assert!(!StatusText::is_valid("OK\r\nSet-Cookie: admin=1"));
        assert!(!StatusText::is_valid("OK\n"));
        assert!(!StatusText::is_valid("nul\0"));
        assert!(!StatusText::is_valid("del\x7f"));
    }
}
