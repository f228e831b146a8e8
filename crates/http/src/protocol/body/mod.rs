//! Body stream adapter.
//!
//! Native transports and render engines produce bytes push-style: they emit data events and an end
//! event whenever they like. Requests and responses consume bytes pull-style through
//! `http_body::Body`. This module bridges the two directions:
//!
//! - [`ByteEmitter`] / [`EmitterHandle`]: an unbounded push channel; emitting never waits
//! - [`from_push`]: turns an emitter into a [`LazyBody`], subscribed on the first pull
//! - [`to_push`]: drains any body into a [`ResponseSink`](crate::sink::ResponseSink) chunk by chunk
//! - [`OnceBody`]: single-consumption holder for request bodies
//! - [`ResponseBody`]: the body type of canonical responses
//!
//! Chunks keep their boundaries and order across every conversion.

mod emitter;
mod lazy_body;
mod once_body;
mod push;
mod response_body;

pub use emitter::ByteEmitter;
pub use emitter::EmitterHandle;
pub use emitter::pump_reader;
pub use lazy_body::LazyBody;
pub use lazy_body::from_push;
pub use once_body::OnceBody;
pub use push::PushOutcome;
pub use push::to_push;
pub use response_body::BoxError;
pub use response_body::ResponseBody;
