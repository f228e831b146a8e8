//! HTTP/1.1 response serialization used by [`WireSink`](crate::sink::WireSink).
//!
//! - [`ResponseEncoder`]: drives a head followed by payload items
//! - head serialization honours a [`StatusText`](crate::protocol::StatusText) reason phrase
//! - payload framing is either `Content-Length` or chunked transfer coding

mod head_encoder;
mod payload_encoder;
mod response_encoder;

pub use head_encoder::HeadEncoder;
pub use payload_encoder::PayloadEncoder;
pub use response_encoder::ResponseEncoder;
