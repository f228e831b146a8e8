use bytes::{Buf, Bytes};

/// A message travelling towards the wire: either the response head or a piece of the payload.
///
/// The generic parameter `T` is the head type, `Data` the payload buffer type (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Status line and headers
    Header(T),
    /// A chunk of payload data or the EOF marker
    Payload(PayloadItem<Data>),
}

/// One event of a byte stream: a chunk, or the end of the stream.
///
/// This is the unit exchanged between a push-style emitter and the pull-style body built on top of
/// it, and also the unit handed to the payload encoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// How a response payload is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// No payload
    Empty,
}
