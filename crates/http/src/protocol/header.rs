//! Translation between native header containers and `http::HeaderMap`.
//!
//! Native transports hand headers over as a list of names, each carrying either a single value or a
//! list of values. On the way in every list element becomes its own map entry. On the way out every
//! entry is appended to the sink as its own header line, and `Set-Cookie` values that were folded
//! into one comma separated string are split back into independent cookies.

use http::header::SET_COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::ParseError;
use crate::sink::ResponseSink;

/// A header value as a native transport exposes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeHeaderValue {
    Single(String),
    List(Vec<String>),
}

impl From<&str> for NativeHeaderValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<String> for NativeHeaderValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for NativeHeaderValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl<const N: usize> From<[&str; N]> for NativeHeaderValue {
    fn from(values: [&str; N]) -> Self {
        Self::List(values.iter().map(|v| (*v).to_owned()).collect())
    }
}

/// Native request headers, in the order the transport received them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeHeaders {
    entries: Vec<(String, NativeHeaderValue)>,
}

impl NativeHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<NativeHeaderValue>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<NativeHeaderValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NativeHeaderValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for NativeHeaders
where
    N: Into<String>,
    V: Into<NativeHeaderValue>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(n, v)| (n.into(), v.into())).collect() }
    }
}

/// Builds a canonical header map: one entry per list element, in the original order.
pub fn to_canonical(native: &NativeHeaders) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::with_capacity(native.len());
    for (name, value) in native.iter() {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ParseError::invalid_header(format!("{name}: {e}")))?;
        match value {
            NativeHeaderValue::List(values) => {
                for value in values {
                    headers.append(header_name.clone(), parse_value(name, value)?);
                }
            }
            NativeHeaderValue::Single(value) => {
                headers.insert(header_name, parse_value(name, value)?);
            }
        }
    }
    Ok(headers)
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue, ParseError> {
    HeaderValue::from_str(value).map_err(|e| ParseError::invalid_header(format!("{name}: {e}")))
}

/// Appends every header to the sink as its own line, splitting folded `Set-Cookie` values.
pub fn from_canonical<S>(headers: &HeaderMap, sink: &mut S)
where
    S: ResponseSink + ?Sized,
{
    for (name, value) in headers {
        if name == SET_COOKIE {
            if let Ok(folded) = value.to_str() {
                for cookie in split_set_cookie(folded) {
                    // each piece is a substring of a valid value
                    if let Ok(cookie) = HeaderValue::from_str(cookie) {
                        sink.append_header(SET_COOKIE, cookie);
                    }
                }
                continue;
            }
        }
        sink.append_header(name.clone(), value.clone());
    }
}

/// Splits a `Set-Cookie` value that holds several cookies joined by commas.
///
/// A comma only separates two cookies when the text after it starts a `name=` pair; the commas of
/// an `Expires=Wed, 21 Oct 2015 07:28:00 GMT` date never do.
pub fn split_set_cookie(value: &str) -> Vec<&str> {
    let mut cookies = Vec::new();
    let mut start = 0;
    for (pos, byte) in value.bytes().enumerate() {
        if byte == b',' && starts_cookie_pair(&value.as_bytes()[pos + 1..]) {
            push_trimmed(&mut cookies, &value[start..pos]);
            start = pos + 1;
        }
    }
    push_trimmed(&mut cookies, &value[start..]);
    cookies
}

fn starts_cookie_pair(rest: &[u8]) -> bool {
    let rest = rest.trim_ascii_start();
    for (index, byte) in rest.iter().enumerate() {
        match byte {
            b'=' => return index > 0,
            b';' | b',' => return false,
            b if b.is_ascii_whitespace() => return false,
            _ => {}
        }
    }
    false
}

fn push_trimmed<'a>(cookies: &mut Vec<&'a str>, cookie: &'a str) {
    let cookie = cookie.trim();
    if !cookie.is_empty() {
        cookies.push(cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use http::header::{CONTENT_TYPE, VARY};

    #[test]
    fn list_values_become_separate_entries_in_order() {
        let native =
            NativeHeaders::new().with("Accept", ["text/html", "application/json", "*/*"]).with("Host", "example.com");

        let headers = to_canonical(&native).unwrap();

        let accept: Vec<_> = headers.get_all("accept").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(accept, ["text/html", "application/json", "*/*"]);
        assert_eq!(headers.get("HOST").unwrap(), "example.com");
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let native = NativeHeaders::new().with("bad header", "x");
        assert!(matches!(to_canonical(&native), Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn split_keeps_expires_dates_intact() {
        let folded = "a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Path=/, b=2; HttpOnly,c=3";
        assert_eq!(
            split_set_cookie(folded),
            ["a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Path=/", "b=2; HttpOnly", "c=3"]
        );
    }

    #[test]
    fn split_handles_trailing_expires_attribute() {
        let folded = "a=1; Expires=Thu, 01 Jan 1970 00:00:00 GMT, b=2";
        assert_eq!(split_set_cookie(folded), ["a=1; Expires=Thu, 01 Jan 1970 00:00:00 GMT", "b=2"]);
        assert_eq!(split_set_cookie("single=value"), ["single=value"]);
    }

    #[test]
    fn writes_every_value_with_append_semantics() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.append(VARY, HeaderValue::from_static("accept"));
        headers.append(VARY, HeaderValue::from_static("cookie"));
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2, c=3; Expires=Wed, 21 Oct 2015 07:28:00 GMT"));

        let mut sink = MemorySink::new();
        let handle = sink.handle();
        from_canonical(&headers, &mut sink);

        let recorded = handle.recorded();
        assert_eq!(recorded.header_values("vary"), ["accept", "cookie"]);
        assert_eq!(
            recorded.header_values("set-cookie"),
            ["a=1; Path=/", "b=2", "c=3; Expires=Wed, 21 Oct 2015 07:28:00 GMT"]
        );
    }
}
