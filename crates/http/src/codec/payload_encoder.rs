use std::io::Write;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use super::head_encoder::BufWriter;
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Frames body chunks according to the payload size the head was committed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload, tracks the bytes still expected
    Length { remaining: u64, eof: bool },
    /// transfer-encoding chunked payload
    Chunked { eof: bool },
    NoBody,
}

impl PayloadEncoder {
    pub fn new(payload_size: PayloadSize) -> Self {
        let kind = match payload_size {
            PayloadSize::Length(remaining) => Kind::Length { remaining, eof: false },
            PayloadSize::Chunked => Kind::Chunked { eof: false },
            PayloadSize::Empty => Kind::NoBody,
        };
        Self { kind }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length { eof, .. } | Kind::Chunked { eof } => *eof,
            Kind::NoBody => true,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match (&mut self.kind, item) {
            (Kind::Chunked { eof: true } | Kind::Length { eof: true, .. } | Kind::NoBody, _) => Ok(()),

            (Kind::Chunked { .. }, PayloadItem::Chunk(bytes)) => {
                // a zero sized chunk would terminate the body early
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(BufWriter(dst), "{:X}\r\n", bytes.remaining())?;
                dst.reserve(bytes.remaining() + 2);
                dst.extend_from_slice(bytes.chunk());
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            (Kind::Chunked { eof }, PayloadItem::Eof) => {
                *eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }

            (Kind::Length { remaining, .. }, PayloadItem::Chunk(bytes)) => {
                let size = bytes.remaining() as u64;
                if size > *remaining {
                    warn!(size, remaining = *remaining, "chunk exceeds the declared content-length");
                    return Err(SendError::invalid_body("chunk exceeds the declared content-length"));
                }
                dst.extend_from_slice(bytes.chunk());
                *remaining -= size;
                Ok(())
            }
            (Kind::Length { remaining, eof }, PayloadItem::Eof) => {
                *eof = true;
                if *remaining > 0 {
                    return Err(SendError::invalid_body(format!(
                        "body ended {remaining} bytes short of content-length"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn chunked_frames_each_chunk_and_terminates() {
        let mut encoder = PayloadEncoder::new(PayloadSize::Chunked);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"<html>")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"6\r\n<html>\r\n0\r\n\r\n");
        assert!(encoder.is_finish());
    }

    #[test]
    fn length_rejects_short_body() {
        let mut encoder = PayloadEncoder::new(PayloadSize::Length(10));
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"12345")), &mut dst).unwrap();
        let result = encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst);

        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }
}
