use serde::{Deserialize, Serialize};

use crate::{EventKind, error::DecodeError};

/// A task lifecycle notification published on the scheduler's event channel.
///
/// Wire format is a JSON object with the keys `event`, `task_name` and
/// `task_id`, all optional. Example:
/// `{"event":"executing","task_name":"send_email","task_id":"abc123"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// What happened to the task.
    #[serde(rename = "event", default)]
    pub kind: EventKind,
    /// Name of the task definition. Shared by every execution of that task.
    #[serde(default)]
    pub task_name: String,
    /// Identifier of one execution attempt. Empty for kinds that are not
    /// tied to a concrete attempt.
    #[serde(default)]
    pub task_id: String,
}

impl Event {
    /// Decode a raw channel payload.
    ///
    /// Unknown keys are ignored and missing keys fall back to their empty
    /// defaults; decoding fails only when the payload is not well-formed
    /// JSON of the expected shape.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
