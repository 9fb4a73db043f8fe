use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::session::{GenerationResult, SessionWriter};
use super::state::{failure_message, status_message, TaskState};
use super::urls::UrlMapper;
use crate::api::types::{ResultBody, StatusBody};
use crate::api::JobApi;
use crate::auth::TokenProvider;
use crate::config::{ClientConfig, ResultSource};
use crate::error::GenerationError;

/// Everything one poll loop needs; moved into the spawned task.
pub(crate) struct PollJob {
    pub api: Arc<dyn JobApi>,
    pub auth: Arc<dyn TokenProvider>,
    pub config: Arc<ClientConfig>,
    pub urls: UrlMapper,
    pub task_id: String,
    pub writer: SessionWriter,
}

/// Drive one task to a terminal state. This is the single exit point of the
/// loop: whatever `poll_until_done` returns is written here, and the attempt's
/// token is cancelled when the guard drops on every path out.
pub(crate) async fn run_poll_loop(job: PollJob) {
    let _release = job.writer.cancel_token().clone().drop_guard();
    let task_id = job.task_id.clone();
    let attempt = job.writer.attempt();

    match poll_until_done(&job).await {
        Ok(result) => {
            if job.writer.succeed(result) {
                info!(task_id = %task_id, attempt, "generation task completed");
            }
        }
        Err(GenerationError::Cancelled) => {
            debug!(task_id = %task_id, attempt, "poll loop cancelled");
        }
        Err(e) => {
            match &e {
                GenerationError::Polling(cause) => {
                    error!(task_id = %task_id, attempt, "status check failed: {cause}");
                }
                GenerationError::Timeout { polls, .. } => {
                    warn!(task_id = %task_id, attempt, polls, "gave up waiting for generation task");
                }
                other => error!(task_id = %task_id, attempt, "generation task failed: {other}"),
            }
            job.writer.fail(&e);
        }
    }
}

async fn poll_until_done(job: &PollJob) -> Result<GenerationResult, GenerationError> {
    let cancel = job.writer.cancel_token();
    let interval = job.config.poll_interval();
    let max_polls = job.config.max_polls;
    let start = Instant::now();
    let mut polls: u32 = 0;

    loop {
        if polls >= max_polls {
            return Err(GenerationError::Timeout {
                polls,
                waited: start.elapsed(),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            _ = sleep(interval) => {}
        }
        polls += 1;

        let token = fresh_token(job).await?;
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            r = job.api.get_status(&job.task_id, token.as_deref()) => {
                r.map_err(GenerationError::Polling)?
            }
        };

        let state = TaskState::from_wire(status.status.as_deref());
        let progress = status.progress.unwrap_or(0.0);
        let message = status_message(&status);
        job.writer.update(|s| {
            s.progress = progress;
            s.status_message = message;
        });

        match state {
            TaskState::Success => return fetch_result(job, status).await,
            TaskState::Failure => {
                return Err(GenerationError::Generation(failure_message(&status)));
            }
            TaskState::Pending | TaskState::Running => {
                info!(
                    task_id = %job.task_id,
                    status = status.status.as_deref().unwrap_or("unknown"),
                    progress,
                    poll = polls,
                    "polling generation task..."
                );
            }
        }
    }
}

/// A token provider may block (interactive refresh), so cancellation wins over it.
async fn fresh_token(job: &PollJob) -> Result<Option<String>, GenerationError> {
    tokio::select! {
        biased;
        _ = job.writer.cancel_token().cancelled() => Err(GenerationError::Cancelled),
        token = job.auth.token() => Ok(token),
    }
}

/// A failed fetch still ends in success: the job finished server-side, so the
/// result is returned marked unavailable instead of failing the attempt.
async fn fetch_result(
    job: &PollJob,
    status: StatusBody,
) -> Result<GenerationResult, GenerationError> {
    let body = match job.config.result_source {
        ResultSource::Inline => inline_result(status),
        ResultSource::Endpoint => {
            let token = fresh_token(job).await?;
            tokio::select! {
                biased;
                _ = job.writer.cancel_token().cancelled() => return Err(GenerationError::Cancelled),
                r = job.api.get_result(&job.task_id, token.as_deref()) => {
                    r.map_err(|e| GenerationError::ResultFetch(e.to_string()))
                }
            }
        }
    };

    match body {
        Ok(body) => Ok(shape_result(&job.task_id, body, &job.urls)),
        Err(e) => {
            warn!(task_id = %job.task_id, "task succeeded but its result is unavailable: {e}");
            Ok(GenerationResult::unavailable(&job.task_id, e.to_string()))
        }
    }
}

fn inline_result(status: StatusBody) -> Result<ResultBody, GenerationError> {
    let raw = status.result.ok_or_else(|| {
        GenerationError::ResultFetch("task finished without a result payload".to_string())
    })?;
    serde_json::from_value(raw)
        .map_err(|e| GenerationError::ResultFetch(format!("malformed result payload: {e}")))
}

fn shape_result(task_id: &str, body: ResultBody, urls: &UrlMapper) -> GenerationResult {
    GenerationResult {
        id: task_id.to_string(),
        video_url: urls.video(body.video_url.as_deref()),
        audio_url: urls.audio(body.audio_url.as_deref()),
        transcript: body.script,
        images_used: body.images_used.unwrap_or_default(),
        unavailable: None,
    }
}
