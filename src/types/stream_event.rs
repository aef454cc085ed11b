use crate::Source;

/// A decoded unit of a chat response stream.
///
/// Produced only by the event-stream decoder; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of answer text to append.
    ContentDelta(String),

    /// The retrieval phase finished; carries the sources it found.
    SearchEnd(Vec<Source>),

    /// The server's end-of-stream sentinel.
    Done,

    /// A record that could not be interpreted, kept verbatim for observability.
    Malformed(String),
}
