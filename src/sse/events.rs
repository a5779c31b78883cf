//! SSE event type shared by the hub and its subscribers

use serde_json::Value;

/// A named event with a JSON payload.
///
/// Every payload is a self-sufficient "state changed as of time T"
/// notice, never an incremental delta, so dropping one under
/// backpressure is harmless: subscribers re-read the state on the next
/// delivered event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        SseEvent {
            event: event.into(),
            data,
        }
    }
}
