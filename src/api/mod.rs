pub mod types;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use types::{CreateTaskResponse, ErrorBody, GenerateBody, ResultBody, StatusBody};

/// The calls a generation attempt makes against the backend.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Create a task and return its ID.
    async fn create_task(&self, body: &GenerateBody, token: Option<&str>) -> Result<String, ApiError>;

    async fn get_status(&self, task_id: &str, token: Option<&str>) -> Result<StatusBody, ApiError>;

    async fn get_result(&self, task_id: &str, token: Option<&str>) -> Result<ResultBody, ApiError>;

    /// Ask the backend to stop a task. Backends without a cancel route do nothing.
    async fn cancel_task(&self, _task_id: &str, _token: Option<&str>) -> Result<(), ApiError> {
        Ok(())
    }
}

pub struct HttpJobApi {
    base_url: String,
    submit_path: String,
    status_path: String,
    result_path: String,
    cancel_path: Option<String>,
    http: Client,
}

impl HttpJobApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self {
            base_url: config.api_base().to_string(),
            submit_path: config.submit_path.clone(),
            status_path: config.status_path.clone(),
            result_path: config.result_path.clone(),
            cancel_path: config.cancel_path.clone(),
            http,
        })
    }

    fn url(&self, path: &str, task_id: Option<&str>) -> String {
        let path = match task_id {
            Some(id) => path.replace("{task_id}", id),
            None => path.to_string(),
        };
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn with_token(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(t) => req.bearer_auth(t),
        None => req,
    }
}

/// Turn a rejected submission into the message the user sees.
async fn rejection(resp: reqwest::Response) -> ApiError {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Rejected {
            status: status.as_u16(),
            message: "Authentication failed. Please log in again.".to_string(),
        };
    }
    let text = resp.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body.summary().unwrap_or_else(|| {
        format!("Failed to start generation task. (HTTP {})", status.as_u16())
    });
    ApiError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    /// POST {submitPath} — returns the task ID.
    async fn create_task(&self, body: &GenerateBody, token: Option<&str>) -> Result<String, ApiError> {
        let url = self.url(&self.submit_path, None);
        debug!(%url, subject = %body.subject, "creating generation task");
        let resp = with_token(self.http.post(&url), token)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)?;

        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }

        let body = resp
            .json::<CreateTaskResponse>()
            .await
            .map_err(|e| ApiError::Parse(format!("create response: {e}")))?;

        body.task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::Parse("no task ID in create response".to_string()))
    }

    /// GET {statusPath} — one poll.
    async fn get_status(&self, task_id: &str, token: Option<&str>) -> Result<StatusBody, ApiError> {
        let url = self.url(&self.status_path, Some(task_id));
        let resp = with_token(self.http.get(&url), token)
            .send()
            .await
            .map_err(ApiError::Network)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: format!("status API error {status}: {body}"),
            });
        }

        resp.json::<StatusBody>()
            .await
            .map_err(|e| ApiError::Parse(format!("status response: {e}")))
    }

    /// GET {resultPath} — only after SUCCESS.
    async fn get_result(&self, task_id: &str, token: Option<&str>) -> Result<ResultBody, ApiError> {
        let url = self.url(&self.result_path, Some(task_id));
        let resp = with_token(self.http.get(&url), token)
            .send()
            .await
            .map_err(ApiError::Network)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: format!("result API error {status}: {body}"),
            });
        }

        resp.json::<ResultBody>()
            .await
            .map_err(|e| ApiError::Parse(format!("result response: {e}")))
    }

    /// DELETE {cancelPath} — only when a cancel route is configured.
    async fn cancel_task(&self, task_id: &str, token: Option<&str>) -> Result<(), ApiError> {
        let Some(path) = self.cancel_path.as_deref() else {
            return Ok(());
        };
        let url = self.url(path, Some(task_id));
        let resp = with_token(self.http.delete(&url), token)
            .send()
            .await
            .map_err(ApiError::Network)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: format!("cancel API error {status}: {body}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn body() -> GenerateBody {
        GenerateBody {
            subject: "history".into(),
            topic: "Rome".into(),
            voice: "female".into(),
            language: "en-US".into(),
            user_id: Some(json!(42)),
            level: "beginner".into(),
        }
    }

    fn api_for(server: &MockServer) -> HttpJobApi {
        HttpJobApi::new(&ClientConfig::with_base_url(server.base_url())).expect("client")
    }

    #[tokio::test]
    async fn create_task_posts_body_with_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/generate")
                    .header("authorization", "Bearer tok")
                    .json_body(json!({
                        "subject": "history",
                        "topic": "Rome",
                        "voice": "female",
                        "language": "en-US",
                        "user_id": 42,
                        "level": "beginner"
                    }));
                then.status(201).json_body(json!({ "task_id": "t1" }));
            })
            .await;

        let id = api_for(&server)
            .create_task(&body(), Some("tok"))
            .await
            .expect("create");
        assert_eq!(id, "t1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_task_without_id_is_a_parse_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/generate");
                then.status(200).json_body(json!({ "status": "queued" }));
            })
            .await;

        let err = api_for(&server).create_task(&body(), None).await.expect_err("no id");
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[tokio::test]
    async fn unauthorized_submission_asks_for_login() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/generate");
                then.status(401).json_body(json!({ "detail": "token expired" }));
            })
            .await;

        let err = api_for(&server).create_task(&body(), None).await.expect_err("401");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "Authentication failed. Please log in again.");
    }

    #[tokio::test]
    async fn rejection_without_detail_reports_http_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/generate");
                then.status(503).body("upstream unavailable");
            })
            .await;

        let err = api_for(&server).create_task(&body(), None).await.expect_err("503");
        assert_eq!(err.to_string(), "Failed to start generation task. (HTTP 503)");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        // Nothing listens on the discard port.
        let api = HttpJobApi::new(&ClientConfig::with_base_url("http://127.0.0.1:9")).expect("client");
        let err = api.create_task(&body(), None).await.expect_err("refused");
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(err.to_string(), "Network error: could not reach the generation service.");
    }

    #[tokio::test]
    async fn status_and_result_use_configured_paths() {
        let server = MockServer::start_async().await;
        let status = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tasks/t9/status");
                then.status(200)
                    .json_body(json!({ "status": "in_progress", "progress": 40, "message": "Drawing" }));
            })
            .await;
        let result = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/tasks/t9/result");
                then.status(200).json_body(json!({
                    "video_url": "/static/videos/t9.mp4",
                    "script": "Long ago",
                    "images_used": ["a.png", "b.png"]
                }));
            })
            .await;

        let cfg = ClientConfig::with_base_url(server.base_url()).legacy_paths();
        let api = HttpJobApi::new(&cfg).expect("client");

        let s = api.get_status("t9", None).await.expect("status");
        assert_eq!(s.status.as_deref(), Some("in_progress"));
        assert_eq!(s.progress, Some(40.0));

        let r = api.get_result("t9", None).await.expect("result");
        assert_eq!(r.script.as_deref(), Some("Long ago"));
        assert_eq!(r.images_used, Some(vec!["a.png".to_string(), "b.png".to_string()]));

        status.assert_async().await;
        result.assert_async().await;
    }

    #[tokio::test]
    async fn cancel_task_deletes_only_when_configured() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/tasks/t5")
                    .header("authorization", "Bearer tok");
                then.status(200).json_body(json!({ "message": "Task cancelled successfully" }));
            })
            .await;

        api_for(&server).cancel_task("t5", Some("tok")).await.expect("no-op without a route");
        delete.assert_hits_async(0).await;

        let mut cfg = ClientConfig::with_base_url(server.base_url());
        cfg.cancel_path = Some("/tasks/{task_id}".into());
        let api = HttpJobApi::new(&cfg).expect("client");
        api.cancel_task("t5", Some("tok")).await.expect("cancel");
        delete.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn status_server_error_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tasks/t2");
                then.status(500);
            })
            .await;

        let err = api_for(&server).get_status("t2", None).await.expect_err("500");
        assert_eq!(err.status(), Some(500));
    }
}
