use std::time::Duration;
use thiserror::Error;

/// Failures talking to the Remote Job API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: could not reach the generation service.")]
    Network(#[source] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Why a generation attempt ended in `Failed` (or, for `ResultFetch`, in a
/// degraded `Succeeded`). The display string is what the UI shows.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Submission(String),

    /// The cause is logged; the UI only ever sees the fixed message.
    #[error("Failed to get task status.")]
    Polling(#[source] ApiError),

    #[error("{0}")]
    Generation(String),

    #[error("Generation timed out after {} without finishing.", format_wait(.waited))]
    Timeout { polls: u32, waited: Duration },

    #[error("Result unavailable: {0}")]
    ResultFetch(String),

    #[error("Generation cancelled.")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// `"600s"` for long waits, `"40ms"` for short ones.
fn format_wait(waited: &Duration) -> String {
    if *waited >= Duration::from_secs(1) {
        format!("{}s", waited.as_secs())
    } else {
        format!("{}ms", waited.as_millis())
    }
}
