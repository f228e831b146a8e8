//! Canonical requests built from native request metadata.
//!
//! The canonical URL is always absolute and always carries the path exactly as the transport
//! received it: downstream routing parses the full original path again, so a path already rewritten
//! by a host router must never leak in here.

use std::fmt;
use std::str::FromStr;

use http::header::{HOST, ORIGIN, USER_AGENT};
use http::uri::Authority;
use http::{HeaderMap, Method, Request, Uri};
use tracing::debug;

use crate::cancel::{AbortSignal, CancellationToken};
use crate::protocol::ParseError;
use crate::protocol::body::{ByteEmitter, LazyBody, OnceBody, from_push};
use crate::protocol::header::{NativeHeaderValue, NativeHeaders, to_canonical};
use crate::sink::ResponseSink;

const X_FORWARDED_HOST: &str = "x-forwarded-host";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata as a native transport hands it over.
#[derive(Debug)]
pub struct NativeRequest {
    pub method: Method,
    /// path and query exactly as received, before any host-side routing
    pub original_url: String,
    pub scheme: Scheme,
    pub headers: NativeHeaders,
    pub body: Option<ByteEmitter>,
}

impl NativeRequest {
    pub fn new(method: Method, original_url: impl Into<String>) -> Self {
        Self {
            method,
            original_url: original_url.into(),
            scheme: Scheme::Http,
            headers: NativeHeaders::new(),
            body: None,
        }
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<NativeHeaderValue>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn body(mut self, emitter: ByteEmitter) -> Self {
        self.body = Some(emitter);
        self
    }
}

/// An immutable request with an absolute URL, a lazily pulled body and a cancellation signal.
#[derive(Debug)]
pub struct CanonicalRequest {
    head: Request<()>,
    body: Option<OnceBody<LazyBody>>,
    signal: AbortSignal,
}

impl CanonicalRequest {
    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn uri(&self) -> &Uri {
        self.head.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// The request body; `None` for GET and HEAD.
    pub fn body(&self) -> Option<&OnceBody<LazyBody>> {
        self.body.as_ref()
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn user_agent(&self) -> &str {
        self.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("")
    }
}

/// Determines whether a request with this method carries a body.
pub fn has_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// Builds the canonical request and a cancellation token bound to `sink`'s lifecycle.
pub fn materialize<S>(native: NativeRequest, sink: &mut S) -> Result<(CanonicalRequest, CancellationToken), ParseError>
where
    S: ResponseSink + ?Sized,
{
    let NativeRequest { method, original_url, scheme, headers, body } = native;

    let headers = to_canonical(&headers)?;
    let origin = resolve_origin(&headers, scheme)?;
    if !original_url.starts_with('/') {
        return Err(ParseError::invalid_uri(format!("expected an origin-form request target, got {original_url:?}")));
    }
    let uri = Uri::try_from(format!("{origin}{original_url}")).map_err(ParseError::invalid_uri)?;

    let body = if has_body(&method) {
        Some(OnceBody::new(from_push(body.unwrap_or_else(ByteEmitter::empty))))
    } else {
        if body.is_some() {
            debug!(%method, "ignoring body emitter of a bodiless request");
        }
        None
    };

    let mut head = Request::new(());
    *head.method_mut() = method;
    *head.uri_mut() = uri;
    *head.headers_mut() = headers;

    let token = CancellationToken::new();
    token.bind(sink);

    Ok((CanonicalRequest { head, body, signal: token.signal() }, token))
}

/// Resolves the request origin.
///
/// An `Origin` header wins unless it is the literal `null`. Otherwise the host comes from
/// `X-Forwarded-Host` or `Host`, and the port from `X-Forwarded-Host` if it names one, else from
/// `Host`.
pub fn resolve_origin(headers: &HeaderMap, scheme: Scheme) -> Result<String, ParseError> {
    if let Some(origin) = header_str(headers, ORIGIN.as_str()) {
        if origin != "null" {
            return Ok(origin.to_owned());
        }
    }

    let forwarded = header_str(headers, X_FORWARDED_HOST)
        .and_then(|value| value.split(',').next())
        .map(parse_authority)
        .transpose()?;
    let host = header_str(headers, HOST.as_str()).map(parse_authority).transpose()?;

    let hostname = match (&forwarded, &host) {
        (Some(authority), _) | (None, Some(authority)) => authority.host(),
        (None, None) => return Err(ParseError::MissingHost),
    };
    let port = forwarded.as_ref().and_then(Authority::port_u16).or_else(|| host.as_ref().and_then(Authority::port_u16));

    Ok(match port {
        Some(port) => format!("{scheme}://{hostname}:{port}"),
        None => format!("{scheme}://{hostname}"),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_authority(value: &str) -> Result<Authority, ParseError> {
    Authority::from_str(value.trim()).map_err(|e| ParseError::invalid_header(format!("host {value:?}: {e}")))
}
