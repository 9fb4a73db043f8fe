mod poller;
pub mod session;
pub mod state;
pub mod urls;


use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::types::GenerateBody;
use crate::api::{HttpJobApi, JobApi};
use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::{ConfigError, GenerationError};
use poller::{run_poll_loop, PollJob};
use session::{ClientSession, Phase, SessionWriter};
use urls::UrlMapper;

pub const DEFAULT_LANGUAGE: &str = "en-US";

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Female,
    Male,
}

impl Voice {
    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Female => "female",
            Voice::Male => "male",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" => Ok(Voice::Female),
            "male" => Ok(Voice::Male),
            other => Err(format!("invalid voice \"{other}\". Valid: female, male")),
        }
    }
}

/// Caller-side correlation ID; the backends have used both numeric IDs and
/// string UIDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub subject: String,
    pub topic: String,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl GenerationRequest {
    pub fn new(subject: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            topic: topic.into(),
            voice: Voice::default(),
            language: default_language(),
            user_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.subject.trim().is_empty() {
            return Err(GenerationError::Submission("subject must not be empty".into()));
        }
        if self.topic.trim().is_empty() {
            return Err(GenerationError::Submission("topic must not be empty".into()));
        }
        Ok(())
    }

    /// Wire body for the submit call, with the fixed `level` added.
    pub fn to_body(&self, level: &str) -> GenerateBody {
        GenerateBody {
            subject: self.subject.clone(),
            topic: self.topic.clone(),
            voice: self.voice.as_str().to_string(),
            language: self.language.clone(),
            user_id: self.user_id.as_ref().map(|id| match id {
                UserId::Number(n) => serde_json::Value::from(*n),
                UserId::Text(s) => serde_json::Value::from(s.as_str()),
            }),
            level: level.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskClient — owns the session, drives one attempt at a time
// ---------------------------------------------------------------------------

struct ActiveAttempt {
    attempt: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

pub struct TaskClient {
    api: Arc<dyn JobApi>,
    auth: Arc<dyn TokenProvider>,
    config: Arc<ClientConfig>,
    urls: UrlMapper,
    state: Arc<watch::Sender<ClientSession>>,
    attempts: AtomicU64,
    active: Mutex<Option<ActiveAttempt>>,
    shutdown: CancellationToken,
}

impl TaskClient {
    pub fn new(api: Arc<dyn JobApi>, auth: Arc<dyn TokenProvider>, config: ClientConfig) -> Self {
        let (tx, _rx) = watch::channel(ClientSession::default());
        Self {
            api,
            auth,
            urls: UrlMapper::from_config(&config),
            config: Arc::new(config),
            state: Arc::new(tx),
            attempts: AtomicU64::new(0),
            active: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Validate `config` and build a client backed by the HTTP job API.
    pub fn from_config(
        config: ClientConfig,
        auth: Arc<dyn TokenProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let api = HttpJobApi::new(&config)
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(Arc::new(api), auth, config))
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> ClientSession {
        self.state.borrow().clone()
    }

    /// Receiver that sees every session change.
    pub fn subscribe(&self) -> watch::Receiver<ClientSession> {
        self.state.subscribe()
    }

    /// Start a new attempt. Any earlier attempt is retired first and can no
    /// longer touch the session. Returns once the submission is settled, with
    /// the phase at `Polling` or `Failed`; polling continues in the background.
    pub async fn submit(&self, request: GenerationRequest) -> ClientSession {
        let writer = self.begin_attempt();
        let attempt = writer.attempt();

        if let Err(e) = request.validate() {
            warn!(attempt, "rejected generation request: {e}");
            writer.fail(&e);
            return self.session();
        }

        info!(attempt, subject = %request.subject, topic = %request.topic, "submitting generation task");

        let Some(token) = self.authorize(&writer).await else {
            return self.session();
        };

        let body = request.to_body(&self.config.level);
        let created = tokio::select! {
            biased;
            _ = writer.cancel_token().cancelled() => return self.session(),
            r = self.api.create_task(&body, token.as_deref()) => r,
        };

        let task_id = match created {
            Ok(id) => id,
            Err(e) => {
                error!(attempt, "generation task submission failed: {e}");
                writer.fail(&GenerationError::Submission(e.to_string()));
                return self.session();
            }
        };
        info!(attempt, task_id = %task_id, "generation task created");

        self.start_polling(writer, task_id)
    }

    /// Attach to a task created earlier (by another process or a previous
    /// run) and poll it exactly like a fresh submission, without the POST.
    /// Supersedes any running attempt the same way `submit` does.
    pub async fn follow(&self, task_id: impl Into<String>) -> ClientSession {
        let task_id = task_id.into().trim().to_string();
        let writer = self.begin_attempt();
        let attempt = writer.attempt();

        if task_id.is_empty() {
            let e = GenerationError::Submission("task ID must not be empty".into());
            warn!(attempt, "rejected follow request: {e}");
            writer.fail(&e);
            return self.session();
        }

        if self.authorize(&writer).await.is_none() {
            return self.session();
        }

        info!(attempt, task_id = %task_id, "following existing generation task");
        self.start_polling(writer, task_id)
    }

    /// Stop the running attempt. A non-terminal session becomes `Failed`;
    /// idle or finished sessions are left alone.
    ///
    /// When the attempt already has a task ID, the backend is asked to stop
    /// it too. That request is best effort and runs in the background; its
    /// handle is returned for callers that want to wait for it.
    pub fn cancel(&self) -> Option<JoinHandle<()>> {
        let (attempt, cancel) = self.current_attempt()?;
        let mut task_id = None;
        let changed = self.state.send_if_modified(|s| {
            if s.attempt != attempt || s.phase.is_terminal() || s.phase == Phase::Idle {
                return false;
            }
            s.phase = Phase::Failed;
            s.error = Some(GenerationError::Cancelled.to_string());
            s.updated_at = Some(chrono::Utc::now());
            task_id = s.task_id.clone();
            true
        });
        cancel.cancel();
        if !changed {
            return None;
        }
        info!(attempt, "generation attempt cancelled");
        task_id.and_then(|id| self.cancel_remote(id))
    }

    /// Wait until the current attempt reaches `Succeeded` or `Failed`.
    /// Returns straight away when nothing has been submitted.
    pub async fn wait_for_terminal(&self) -> ClientSession {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|s| s.phase.is_terminal() || s.phase == Phase::Idle)
            .await
            .map(|s| s.clone());
        match settled {
            Ok(s) => s,
            Err(_) => self.session(),
        }
    }

    /// Number the next attempt, retire the previous one and reset the
    /// session to `Submitting` for it.
    fn begin_attempt(&self) -> SessionWriter {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.shutdown.child_token();
        self.retire_previous(attempt, cancel.clone());

        self.state.send_if_modified(|s| {
            if attempt <= s.attempt {
                return false;
            }
            *s = ClientSession::submitting(attempt);
            true
        });
        SessionWriter::new(Arc::clone(&self.state), attempt, cancel)
    }

    /// Fetch the token for the attempt's first request. `None` means the
    /// attempt is over: it was cancelled, or auth is required and missing.
    async fn authorize(&self, writer: &SessionWriter) -> Option<Option<String>> {
        let token = tokio::select! {
            biased;
            _ = writer.cancel_token().cancelled() => return None,
            t = self.auth.token() => t,
        };
        if self.config.require_auth && token.is_none() {
            writer.fail(&GenerationError::Submission("Not authenticated".into()));
            return None;
        }
        Some(token)
    }

    /// Move the attempt to `Polling` on `task_id` and hand it to a background loop.
    fn start_polling(&self, writer: SessionWriter, task_id: String) -> ClientSession {
        let attempt = writer.attempt();
        let polling = writer.update(|s| {
            s.phase = Phase::Polling;
            s.task_id = Some(task_id.clone());
        });
        if !polling {
            return self.session();
        }

        let handle = tokio::spawn(run_poll_loop(PollJob {
            api: Arc::clone(&self.api),
            auth: Arc::clone(&self.auth),
            config: Arc::clone(&self.config),
            urls: self.urls.clone(),
            task_id,
            writer,
        }));
        self.track_task(attempt, handle);

        self.session()
    }

    fn cancel_remote(&self, task_id: String) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(task_id = %task_id, "no runtime for the cancel request, skipping it");
            return None;
        };
        let api = Arc::clone(&self.api);
        let auth = Arc::clone(&self.auth);
        let limit = self.config.request_timeout();
        Some(runtime.spawn(async move {
            let request = async {
                let token = auth.token().await;
                api.cancel_task(&task_id, token.as_deref()).await
            };
            match tokio::time::timeout(limit, request).await {
                Ok(Ok(())) => debug!(task_id = %task_id, "cancel request sent"),
                Ok(Err(e)) => warn!(task_id = %task_id, "cancel request failed: {e}"),
                Err(_) => warn!(task_id = %task_id, "cancel request timed out"),
            }
        }))
    }

    fn retire_previous(&self, attempt: u64, cancel: CancellationToken) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        // A racing submit got a later number and already took over.
        if active.as_ref().is_some_and(|current| current.attempt > attempt) {
            cancel.cancel();
            return;
        }
        let previous = active.replace(ActiveAttempt {
            attempt,
            cancel,
            task: None,
        });
        if let Some(prev) = previous {
            prev.cancel.cancel();
            if let Some(task) = prev.task {
                task.abort();
            }
        }
    }

    fn track_task(&self, attempt: u64, handle: JoinHandle<()>) {
        match self.active.lock() {
            Ok(mut active) => match active.as_mut() {
                Some(current) if current.attempt == attempt => current.task = Some(handle),
                // A newer submit already retired this attempt.
                _ => handle.abort(),
            },
            Err(_) => handle.abort(),
        }
    }

    fn current_attempt(&self) -> Option<(u64, CancellationToken)> {
        self.active
            .lock()
            .ok()?
            .as_ref()
            .map(|a| (a.attempt, a.cancel.clone()))
    }
}

impl Drop for TaskClient {
    /// Disposal: loops stop without writing to the session.
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Ok(mut active) = self.active.lock() {
            if let Some(task) = active.take().and_then(|a| a.task) {
                task.abort();
            }
        }
    }
}
