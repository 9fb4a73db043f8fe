use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
/// 300 polls at the default interval is ten minutes.
pub const DEFAULT_MAX_POLLS: u32 = 300;

// ---------------------------------------------------------------------------
// ClientConfig — read from {configDir}/tale-client/settings.json, then env
// ---------------------------------------------------------------------------

/// Where the payload of a finished task comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// One extra GET on the result path after SUCCESS.
    #[default]
    Endpoint,
    /// The `result` object embedded in the SUCCESS status body.
    Inline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    #[serde(alias = "baseURL", alias = "apiUrl")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_submit_path")]
    pub submit_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default = "default_result_path")]
    pub result_path: String,
    /// Route used to stop a task server-side on cancel, e.g. `/tasks/{task_id}`.
    #[serde(default)]
    pub cancel_path: Option<String>,
    #[serde(default)]
    pub result_source: ResultSource,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub require_auth: bool,
    /// Base that relative media locators are resolved against. Defaults to `base_url`.
    #[serde(default)]
    pub static_base_url: Option<String>,
    /// When set, video locators are reduced to their file name and re-rooted here.
    #[serde(default)]
    pub video_prefix: Option<String>,
    #[serde(default)]
    pub audio_prefix: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_submit_path() -> String {
    "/generate".to_string()
}

fn default_status_path() -> String {
    "/tasks/{task_id}".to_string()
}

fn default_result_path() -> String {
    "/tasks/{task_id}/result".to_string()
}

fn default_level() -> String {
    "beginner".to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_polls() -> u32 {
    DEFAULT_MAX_POLLS
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            submit_path: default_submit_path(),
            status_path: default_status_path(),
            result_path: default_result_path(),
            cancel_path: None,
            result_source: ResultSource::default(),
            level: default_level(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            request_timeout_secs: default_request_timeout_secs(),
            require_auth: false,
            static_base_url: None,
            video_prefix: None,
            audio_prefix: None,
        }
    }
}

impl ClientConfig {
    /// Config for a backend at `base_url`, everything else defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Path layout of the first API generation (`/api/v1/tasks/...`).
    pub fn legacy_paths(mut self) -> Self {
        self.submit_path = "/api/v1/tasks/generate".to_string();
        self.status_path = "/api/v1/tasks/{task_id}/status".to_string();
        self.result_path = "/api/v1/tasks/{task_id}/result".to_string();
        self.cancel_path = Some("/api/v1/tasks/{task_id}".to_string());
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on time spent polling one task.
    pub fn poll_deadline(&self) -> Duration {
        self.poll_interval() * self.max_polls
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL with any trailing slash removed.
    pub fn api_base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base().is_empty() {
            return Err(ConfigError::Invalid("baseUrl must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("pollIntervalMs must be greater than 0".into()));
        }
        if self.max_polls == 0 {
            return Err(ConfigError::Invalid("maxPolls must be greater than 0".into()));
        }
        let cancel = self.cancel_path.as_ref().map(|p| ("cancelPath", p));
        let paths = [
            ("statusPath", &self.status_path),
            ("resultPath", &self.result_path),
        ];
        for (name, path) in paths.into_iter().chain(cancel) {
            if !path.contains("{task_id}") {
                return Err(ConfigError::Invalid(format!(
                    "{name} must contain a {{task_id}} placeholder, got \"{path}\""
                )));
            }
        }
        Ok(())
    }

    /// Apply `TALE_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("TALE_API_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup("TALE_API_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(raw) = lookup("TALE_POLL_INTERVAL_MS") {
            self.poll_interval_ms = raw.trim().parse().map_err(|_| ConfigError::Env {
                name: "TALE_POLL_INTERVAL_MS",
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup("TALE_MAX_POLLS") {
            self.max_polls = raw.trim().parse().map_err(|_| ConfigError::Env {
                name: "TALE_MAX_POLLS",
                value: raw.clone(),
            })?;
        }
        Ok(())
    }
}

/// `{configDir}/tale-client/settings.json`, if the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tale-client").join("settings.json"))
}

/// Read settings from `path`. A missing file yields the defaults; an
/// unreadable or malformed one is an error.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ClientConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
