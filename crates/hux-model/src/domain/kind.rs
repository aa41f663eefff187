use serde::{Deserialize, Serialize};

/// Lifecycle stage reported by the scheduler for a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Task has been put on the schedule.
    Scheduled,
    /// Task execution has started.
    Executing,
    /// Task execution finished successfully.
    Complete,
    /// Task execution finished with an error.
    Error,
    /// Task failed to acquire its lock and did not run.
    Locked,
    /// Task was canceled before running.
    Canceled,
    /// Task expired before it could run.
    Expired,
    /// Task is being retried after a failure.
    Retrying,
    /// Task was revoked.
    Revoked,
    /// Task execution was interrupted.
    Interrupted,
    /// Any kind this exporter does not know about.
    ///
    /// Also produced when the `event` key is missing, so newer scheduler
    /// versions can add kinds without breaking decoding.
    #[serde(other)]
    #[default]
    Unknown,
}

impl EventKind {
    /// Returns `true` for the kinds that end a started execution
    /// (`complete` and `error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error)
    }
}
