//! Observer trait for client activity.
//!
//! Install a [`ClientLogger`] on a [`KbClient`](crate::KbClient) to record every pipeline
//! outcome, refresh attempt, decoded stream event and finished turn. Malformed stream
//! records reach the logger and nowhere else; they never abort a stream.

use crate::{ChatMessage, PipelineOutcome, StreamEvent};

/// A trait for observing client operations.
///
/// Every method has an empty default so implementors only override what they need.
///
/// # Example
///
/// ```rust
/// use std::sync::Mutex;
///
/// use kbchat::{ClientLogger, StreamEvent};
///
/// #[derive(Default)]
/// struct MalformedRecords(Mutex<Vec<String>>);
///
/// impl ClientLogger for MalformedRecords {
///     fn log_stream_event(&self, event: &StreamEvent) {
///         if let StreamEvent::Malformed(raw) = event {
///             self.0.lock().unwrap().push(raw.clone());
///         }
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Called once per pipeline call with its terminal outcome.
    fn log_outcome(&self, target: &str, outcome: &PipelineOutcome) {
        _ = target;
        _ = outcome;
    }

    /// Called after every refresh attempt that reached the network.
    fn log_refresh(&self, succeeded: bool) {
        _ = succeeded;
    }

    /// Called for each event decoded from a chat stream, in arrival order.
    fn log_stream_event(&self, event: &StreamEvent) {
        _ = event;
    }

    /// Called once an assistant turn is finalized.
    fn log_turn(&self, message: &ChatMessage) {
        _ = message;
    }
}

/// A logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl ClientLogger for NoopLogger {}
