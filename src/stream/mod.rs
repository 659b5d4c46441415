//! Streaming message pipeline
//!
//! Bytes from the network go through [`StreamDecoder`] into SSE records, and
//! [`StreamTransport`] turns those records into an ordered channel of
//! [`TransportEvent`]s for whoever owns the turn.

pub mod decoder;
pub mod transport;

pub use decoder::{decode_stream, SseEvent, StreamDecoder, Utf8Decoder, DONE_EVENT, DONE_SENTINEL};
pub use transport::{
    StreamTransport, TransportConfig, TransportError, TransportEvent, TurnEvents, TurnHandle,
    DEFAULT_TIMEOUT,
};
