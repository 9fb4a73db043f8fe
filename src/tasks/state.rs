use serde::{Deserialize, Serialize};

use crate::api::types::StatusBody;

const DEFAULT_STATUS_MESSAGE: &str = "Processing...";
const DEFAULT_FAILURE_MESSAGE: &str = "Video generation failed.";

/// Server task state, normalized across API generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskState {
    /// Unknown or missing values count as still running.
    pub fn from_wire(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return TaskState::Running;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "received" | "waiting" => TaskState::Pending,
            "success" | "succeeded" | "completed" | "done" => TaskState::Success,
            "failure" | "failed" | "error" | "revoked" | "cancelled" | "expired" => {
                TaskState::Failure
            }
            _ => TaskState::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Text shown next to the progress bar for this poll.
pub fn status_message(body: &StatusBody) -> String {
    non_empty(body.message.as_deref())
        .unwrap_or(DEFAULT_STATUS_MESSAGE)
        .to_string()
}

/// Why the server says the job failed: `error`, then `message`, then a
/// string `info`, then the generic fallback.
pub fn failure_message(body: &StatusBody) -> String {
    non_empty(body.error.as_deref())
        .or_else(|| non_empty(body.message.as_deref()))
        .or_else(|| non_empty(body.info.as_ref().and_then(|v| v.as_str())))
        .unwrap_or(DEFAULT_FAILURE_MESSAGE)
        .to_string()
}
