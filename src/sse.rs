//! Server-sent event decoding for chat responses.
//!
//! A chat stream is a sequence of records separated by a blank line. The first line of
//! a record that starts with `data: ` carries its payload: either a JSON object or the
//! `[DONE]` sentinel. [`EventStreamDecoder`] does the framing over an owned buffer, so
//! the events decoded from a body never depend on how the body was chunked.

use bytes::{Buf, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::codec::Decoder;

use crate::observability::{STREAM_BYTES, STREAM_EVENTS, STREAM_MALFORMED};
use crate::transport::ByteStream;
use crate::{Error, Result, Source, StreamEvent};

/// Prefix of a record's payload line.
pub const DATA_MARKER: &str = "data: ";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Type tag of the event closing the retrieval phase.
pub const SEARCH_END_TYPE: &str = "searching_end";

/// Frames a chat event stream into [`StreamEvent`]s.
///
/// Once the `[DONE]` sentinel has been decoded every further byte is discarded.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    finished: bool,
    // Bytes at the front of the buffer already known to hold no delimiter.
    scanned: usize,
}

impl EventStreamDecoder {
    /// Creates a decoder at the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Decoder for EventStreamDecoder {
    type Item = StreamEvent;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<StreamEvent>> {
        loop {
            if self.finished {
                buf.clear();
                self.scanned = 0;
                return Ok(None);
            }
            let Some((end, delimiter)) = find_delimiter(buf, self.scanned) else {
                // The last three bytes may start a delimiter completed by the next chunk.
                self.scanned = buf.len().saturating_sub(3);
                return Ok(None);
            };
            self.scanned = 0;
            let record = buf.split_to(end);
            buf.advance(delimiter);
            if let Some(event) = parse_record(&record) {
                if event == StreamEvent::Done {
                    self.finished = true;
                }
                return Ok(Some(event));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<StreamEvent>> {
        let event = self.decode(buf)?;
        if event.is_none() && !buf.is_empty() {
            tracing::debug!(bytes = buf.len(), "discarding unterminated trailing record");
            buf.clear();
            self.scanned = 0;
        }
        Ok(event)
    }
}

/// Returns the offset and length of the first record delimiter in `buf` that starts
/// at or after `from`.
fn find_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let from = from.min(buf.len());
    for (idx, window) in buf.windows(2).enumerate().skip(from) {
        if window == b"\n\n" {
            return Some((idx, 2));
        }
        if window == b"\r\n" && buf[idx + 2..].starts_with(b"\r\n") {
            return Some((idx, 4));
        }
    }
    None
}

/// Interprets one delimiter-bounded record. Records without a payload line yield `None`.
fn parse_record(record: &[u8]) -> Option<StreamEvent> {
    let Ok(text) = std::str::from_utf8(record) else {
        return Some(StreamEvent::Malformed(
            String::from_utf8_lossy(record).into_owned(),
        ));
    };
    let payload = text.lines().find_map(|line| line.strip_prefix(DATA_MARKER))?;
    if payload.trim_end() == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }
    Some(parse_payload(payload))
}

/// Interprets a record's JSON payload.
///
/// A `searching_end` type tag wins over any text the object carries, and always ends
/// the retrieval phase: source entries that cannot be read are dropped.
pub fn parse_payload(payload: &str) -> StreamEvent {
    let malformed = || StreamEvent::Malformed(payload.to_string());
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(payload) else {
        return malformed();
    };
    if object.get("type").and_then(Value::as_str) == Some(SEARCH_END_TYPE) {
        return StreamEvent::SearchEnd(parse_sources(object.get("sources")));
    }
    match object.get("content") {
        Some(Value::String(text)) if !text.is_empty() => StreamEvent::ContentDelta(text.clone()),
        _ => malformed(),
    }
}

fn parse_sources(sources: Option<&Value>) -> Vec<Source> {
    let Some(Value::Array(entries)) = sources else {
        if matches!(sources, Some(other) if !other.is_null()) {
            tracing::debug!("ignoring non-list sources in search end record");
        }
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match Source::deserialize(entry) {
            Ok(source) => Some(source),
            Err(err) => {
                tracing::debug!(%err, %entry, "dropping unreadable source");
                None
            }
        })
        .collect()
}

struct DecodeState {
    body: ByteStream,
    buffer: BytesMut,
    decoder: EventStreamDecoder,
    exhausted: bool,
}

/// Decodes a response body into a lazy, finite sequence of events.
///
/// The sequence ends at the `[DONE]` sentinel (which is not yielded) or when the body
/// ends. Malformed records are yielded as [`StreamEvent::Malformed`] and do not stop
/// the stream. A failure of the body itself is yielded once as `Err` and ends the
/// sequence.
pub fn decode_stream(body: ByteStream) -> impl Stream<Item = Result<StreamEvent>> + Send {
    let state = DecodeState {
        body,
        buffer: BytesMut::new(),
        decoder: EventStreamDecoder::new(),
        exhausted: false,
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            let decoded = if state.exhausted {
                state.decoder.decode_eof(&mut state.buffer)
            } else {
                state.decoder.decode(&mut state.buffer)
            };
            match decoded {
                Ok(Some(StreamEvent::Done)) => return None,
                Ok(Some(event)) => {
                    STREAM_EVENTS.click();
                    if let StreamEvent::Malformed(raw) = &event {
                        STREAM_MALFORMED.click();
                        tracing::warn!(record = %raw, "malformed stream record");
                    }
                    return Some((Ok(event), Some(state)));
                }
                Ok(None) if state.exhausted => return None,
                Ok(None) => {}
                Err(err) => return Some((Err(err), None)),
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    STREAM_BYTES.count(chunk.len() as u64);
                    state.buffer.extend_from_slice(&chunk);
                }
                Some(Err(err)) => return Some((Err(err), None)),
                None => state.exhausted = true,
            }
        }
    })
}
