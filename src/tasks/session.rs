use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
}

impl Phase {
    /// `Succeeded` and `Failed` are absorbing until the next submit.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// The task ID the result belongs to.
    pub id: String,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub images_used: Vec<String>,
    /// Set when the job finished but its payload could not be fetched.
    pub unavailable: Option<String>,
}

impl GenerationResult {
    pub(crate) fn unavailable(id: &str, reason: String) -> Self {
        Self {
            id: id.to_string(),
            video_url: None,
            audio_url: None,
            transcript: None,
            images_used: Vec::new(),
            unavailable: Some(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

/// What the UI renders for the current generation attempt.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    /// Increases with every submit; 0 before the first one.
    pub attempt: u64,
    pub phase: Phase,
    pub task_id: Option<String>,
    pub progress: f64,
    pub status_message: String,
    pub error: Option<String>,
    pub result: Option<GenerationResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ClientSession {
    pub(crate) fn submitting(attempt: u64) -> Self {
        let now = Utc::now();
        Self {
            attempt,
            phase: Phase::Submitting,
            task_id: None,
            progress: 0.0,
            status_message: "Initializing generation...".to_string(),
            error: None,
            result: None,
            started_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Write access to the shared session for one attempt. Every write is a
/// compare-and-set under the watch channel's lock: it is dropped if a newer
/// attempt owns the session, the attempt was cancelled, or the session is
/// already terminal.
#[derive(Clone)]
pub(crate) struct SessionWriter {
    state: Arc<watch::Sender<ClientSession>>,
    attempt: u64,
    cancel: CancellationToken,
}

impl SessionWriter {
    pub(crate) fn new(
        state: Arc<watch::Sender<ClientSession>>,
        attempt: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            attempt,
            cancel,
        }
    }

    pub(crate) fn attempt(&self) -> u64 {
        self.attempt
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns whether the write was applied.
    pub(crate) fn update(&self, f: impl FnOnce(&mut ClientSession)) -> bool {
        self.state.send_if_modified(|s| {
            if s.attempt != self.attempt || s.phase.is_terminal() || self.cancel.is_cancelled() {
                return false;
            }
            f(s);
            s.updated_at = Some(Utc::now());
            true
        })
    }

    pub(crate) fn fail(&self, err: &GenerationError) -> bool {
        let message = err.to_string();
        self.update(|s| {
            s.phase = Phase::Failed;
            s.error = Some(message);
        })
    }

    pub(crate) fn succeed(&self, result: GenerationResult) -> bool {
        self.update(|s| {
            s.phase = Phase::Succeeded;
            s.progress = 100.0;
            s.result = Some(result);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> Arc<watch::Sender<ClientSession>> {
        Arc::new(watch::channel(ClientSession::default()).0)
    }

    #[test]
    fn stale_attempt_cannot_write() {
        let state = channel();
        state.send_replace(ClientSession::submitting(2));
        let old = SessionWriter::new(Arc::clone(&state), 1, CancellationToken::new());
        assert!(!old.update(|s| s.progress = 50.0));
        assert_eq!(state.borrow().progress, 0.0);
    }

    #[test]
    fn cancelled_writer_is_inert() {
        let state = channel();
        state.send_replace(ClientSession::submitting(1));
        let token = CancellationToken::new();
        let writer = SessionWriter::new(Arc::clone(&state), 1, token.clone());
        token.cancel();
        assert!(!writer.fail(&GenerationError::Cancelled));
        assert_eq!(state.borrow().phase, Phase::Submitting);
    }

    #[test]
    fn terminal_phase_is_absorbing() {
        let state = channel();
        state.send_replace(ClientSession::submitting(1));
        let writer = SessionWriter::new(Arc::clone(&state), 1, CancellationToken::new());
        assert!(writer.fail(&GenerationError::Generation("boom".into())));
        assert!(!writer.update(|s| s.progress = 70.0));
        assert!(!writer.succeed(GenerationResult::unavailable("t", "x".into())));

        let s = state.borrow();
        assert_eq!(s.phase, Phase::Failed);
        assert_eq!(s.error.as_deref(), Some("boom"));
        assert!(s.result.is_none());
    }

    #[test]
    fn success_forces_full_progress() {
        let state = channel();
        state.send_replace(ClientSession::submitting(1));
        let writer = SessionWriter::new(Arc::clone(&state), 1, CancellationToken::new());
        writer.update(|s| s.progress = 35.0);
        assert!(writer.succeed(GenerationResult::unavailable("t1", "gone".into())));
        let s = state.borrow();
        assert_eq!(s.phase, Phase::Succeeded);
        assert_eq!(s.progress, 100.0);
        assert!(!s.result.as_ref().expect("result").is_available());
    }
}
