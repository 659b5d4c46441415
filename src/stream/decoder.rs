//! SSE (Server-Sent Events) record decoding
//!
//! Network chunks arrive with arbitrary boundaries. [`StreamDecoder`] buffers
//! text until a blank line closes a record, then turns each record into an
//! [`SseEvent`]. Multi-line `data:` fields are joined with `\n`, and the data is
//! never trimmed because leading whitespace is part of a token.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event type the server uses to close a stream
pub const DONE_EVENT: &str = "done";

/// Sentinel payload some servers send instead of (or as well as) a `done` event
pub const DONE_SENTINEL: &str = "[DONE]";

const RECORD_SEPARATOR: &str = "\n\n";
const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// One decoded SSE record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseEvent {
    /// Value of the `event:` line, empty when the record had none
    pub event: String,
    /// All `data:` lines joined with `\n`
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// Whether this record marks the logical end of the stream
    pub fn is_terminal(&self) -> bool {
        self.event == DONE_EVENT || self.data.trim() == DONE_SENTINEL
    }
}

/// Incremental UTF-8 decoder that holds back a multi-byte sequence split
/// across two chunks instead of replacing it.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any held-back tail) as forms complete
    /// characters. Invalid sequences become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut input = buf.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));

                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.carry = rest.to_vec();
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still held back
    pub fn finish(&mut self) -> String {
        let carry = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&carry).into_owned()
    }
}

/// Buffers text fragments and emits complete SSE records
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: String,
    utf8: Utf8Decoder,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the network
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let text = self.utf8.decode(bytes);
        self.push(&text)
    }

    /// Feed a text fragment and return every record it completed
    pub fn push(&mut self, fragment: &str) -> Vec<SseEvent> {
        self.pending.push_str(fragment);
        if self.pending.contains('\r') {
            self.pending = self.pending.replace("\r\n", "\n");
        }

        let Some(last_separator) = self.pending.rfind(RECORD_SEPARATOR) else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_separator + RECORD_SEPARATOR.len());
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(RECORD_SEPARATOR)
            .filter_map(parse_record)
            .collect()
    }

    /// Signal end of input; decodes whatever record is still pending
    pub fn finish(&mut self) -> Option<SseEvent> {
        let tail = self.utf8.finish();
        self.pending.push_str(&tail);
        let pending = std::mem::take(&mut self.pending);
        parse_record(&pending)
    }
}

/// Parse a single record. Returns `None` for records that carry no `event:`
/// or `data:` line (blank records, comments, keep-alives).
fn parse_record(record: &str) -> Option<SseEvent> {
    if record.trim().is_empty() {
        return None;
    }

    let mut event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut recognized = false;

    for line in record.split('\n') {
        if let Some(value) = line.strip_prefix(EVENT_PREFIX) {
            event = value.trim().to_string();
            recognized = true;
        } else if let Some(value) = line.strip_prefix(DATA_PREFIX) {
            data_lines.push(value);
            recognized = true;
        }
    }

    if !recognized {
        debug!("Dropping SSE record without event or data lines: {:?}", record);
        return None;
    }

    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Turn a stream of raw byte chunks into a lazy stream of SSE events.
///
/// Chunk errors are passed through and end the stream. The pending record is
/// flushed once the chunk stream is exhausted.
pub fn decode_stream<S, E>(chunks: S) -> impl Stream<Item = Result<SseEvent, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    async_stream::try_stream! {
        let mut decoder = StreamDecoder::new();
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            for event in decoder.push_bytes(&chunk) {
                yield event;
            }
        }

        if let Some(event) = decoder.finish() {
            yield event;
        }
    }
}
