//! Serializes a response head into an HTTP/1.1 status line and header block.
//!
//! The framing header (`Content-Length` or `Transfer-Encoding: chunked`) is derived from the
//! [`PayloadSize`] the head is committed with, overriding whatever the application put there.

use std::io;
use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Version, header};
use tokio_util::codec::Encoder;
use tracing::{error, warn};

use crate::protocol::{PayloadSize, ResponseHead, SendError, StatusText};

const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        if head.version() != Version::HTTP_11 {
            error!(http_version = ?head.version(), "unsupported http version");
            return Err(io::Error::from(ErrorKind::Unsupported).into());
        }

        let canonical = head.status().canonical_reason().unwrap_or("");
        let reason = match head.extensions().get::<StatusText>() {
            Some(text) if StatusText::is_valid(text.as_str()) => text.as_str(),
            Some(text) => {
                warn!(status_text = ?text.as_str(), "invalid reason phrase, using the canonical one");
                canonical
            }
            None => canonical,
        };

        dst.reserve(INIT_HEADER_SIZE);
        write!(BufWriter(dst), "HTTP/1.1 {} {}\r\n", head.status().as_str(), reason)?;

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }

        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut` whose capacity was already reserved.
pub(crate) struct BufWriter<'a>(pub(crate) &'a mut BytesMut);

impl Write for BufWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
