use std::io;
use std::io::ErrorKind;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use super::head_encoder::HeadEncoder;
use super::payload_encoder::PayloadEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};

/// Encodes a response as a head followed by payload items.
///
/// A head must come first; payload items are framed by the encoder chosen from the head's
/// [`PayloadSize`]. After EOF the encoder is ready for the next response.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    head_encoder: HeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(PayloadEncoder::new(payload_size));
                self.head_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}
