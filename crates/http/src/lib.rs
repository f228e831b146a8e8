//! Transport bridge between native HTTP transports and canonical request/response values.
//!
//! Native transports push bytes: a socket emits data and end events, a response sink accepts
//! status, header lines and body chunks one by one and reports when it closed or finished.
//! Canonical values are pulled: an `http::Request`-like [`CanonicalRequest`](request::CanonicalRequest)
//! whose body is an `http_body::Body`, and an `http::Response` whose body is drained on demand.
//!
//! # Components
//!
//! - [`protocol::header`]: native header lists ↔ `http::HeaderMap`, including `Set-Cookie` splitting
//! - [`protocol::body`]: push emitters ↔ pull bodies, single-consumption request bodies
//! - [`request`]: builds the canonical request from native metadata
//! - [`cancel`]: the per-request cancellation token and its read-only signal
//! - [`flush`]: writes a canonical response onto a sink
//! - [`sink`]: the sink contract, an HTTP/1.1 wire sink and an in-memory sink
//! - [`codec`]: HTTP/1.1 response serialization used by the wire sink
//!
//! # Example
//!
//! ```no_run
//! use http::{Method, Response};
//! use micro_render_http::flush::flush;
//! use micro_render_http::protocol::body::ResponseBody;
//! use micro_render_http::request::{materialize, NativeRequest};
//! use micro_render_http::sink::WireSink;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sink = WireSink::new(tokio::io::stdout());
//! let native = NativeRequest::new(Method::GET, "/hello").header("Host", "localhost:8080");
//! let (request, _token) = materialize(native, &mut sink)?;
//!
//! let response = Response::new(ResponseBody::from(format!("hello {}", request.uri())));
//! flush(response, &mut sink, request.signal()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 serialization only (no HTTP/2 or HTTP/3 framing)
//! - No TLS termination

pub mod cancel;
pub mod codec;
pub mod flush;
pub mod protocol;
pub mod request;
pub mod sink;
