use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task creation
// POST {baseURL}{submitPath}  → { task_id }
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GenerateBody {
    pub subject: String,
    pub topic: String,
    pub voice: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    /// Always sent; the backend picks its script style from it.
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: Option<String>,
}

/// Error payload of a rejected submission. FastAPI sends `detail` either as a
/// plain string or as a list of validation entries.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<ErrorDetail>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Validation(Vec<ValidationEntry>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
pub struct ValidationEntry {
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    #[serde(default)]
    pub msg: String,
}

impl ValidationEntry {
    /// `"<loc joined by '.'>: <msg>"`, with `field` standing in for a missing location.
    pub fn describe(&self) -> String {
        let loc = self
            .loc
            .iter()
            .map(|part| match part {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        let loc = if loc.is_empty() { "field".to_string() } else { loc };
        format!("{loc}: {}", self.msg)
    }
}

impl ErrorBody {
    /// Flatten the payload into one line, if it says anything useful.
    pub fn summary(&self) -> Option<String> {
        match &self.detail {
            Some(ErrorDetail::Text(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(ErrorDetail::Validation(entries)) if !entries.is_empty() => {
                return Some(
                    entries
                        .iter()
                        .map(ValidationEntry::describe)
                        .collect::<Vec<_>>()
                        .join("; "),
                );
            }
            _ => {}
        }
        self.message.clone().filter(|m| !m.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Task status
// GET {baseURL}{statusPath}  → status + progress (+ inline result on newer API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>, // PENDING | STARTED | SUCCESS | FAILURE | pending | in_progress | completed | failed
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Celery workers report their last state here; only string values are used.
    pub info: Option<serde_json::Value>,
    /// Kept raw so a malformed inline result degrades the success instead of
    /// failing the status poll.
    pub result: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Task result
// GET {baseURL}{resultPath}  → media locators + script
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultBody {
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub script: Option<String>,
    /// `null` and absent both read as `None`.
    #[serde(default)]
    pub images_used: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_detail_is_flattened() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"detail":[{"loc":["topic"],"msg":"field required"}]}"#,
        )
        .expect("deserialize");
        assert_eq!(body.summary().as_deref(), Some("topic: field required"));
    }

    #[test]
    fn validation_entries_join_with_semicolons_and_dotted_locations() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"detail":[
                {"loc":["body","subject"],"msg":"field required"},
                {"loc":["body","items",0],"msg":"bad item"},
                {"msg":"something odd"}
            ]}"#,
        )
        .expect("deserialize");
        assert_eq!(
            body.summary().as_deref(),
            Some("body.subject: field required; body.items.0: bad item; field: something odd")
        );
    }

    #[test]
    fn string_detail_passes_through() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"detail":"Quota exceeded"}"#).expect("deserialize");
        assert_eq!(body.summary().as_deref(), Some("Quota exceeded"));
    }

    #[test]
    fn message_is_used_when_detail_is_missing_or_unusable() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"detail":{"code":7},"message":"backend down"}"#)
                .expect("deserialize");
        assert_eq!(body.summary().as_deref(), Some("backend down"));

        let empty = ErrorBody::default();
        assert!(empty.summary().is_none());
    }

    #[test]
    fn generate_body_omits_absent_user_id() {
        let body = GenerateBody {
            subject: "history".into(),
            topic: "Rome".into(),
            voice: "female".into(),
            language: "en-US".into(),
            user_id: None,
            level: "beginner".into(),
        };
        let v = serde_json::to_value(&body).expect("serialize");
        assert_eq!(v["subject"], "history");
        assert_eq!(v["level"], "beginner");
        assert!(v.get("user_id").is_none());
    }

    #[test]
    fn status_body_tolerates_sparse_payloads() {
        let s: StatusBody = serde_json::from_str(r#"{"status":"SUCCESS"}"#).expect("deserialize");
        assert_eq!(s.status.as_deref(), Some("SUCCESS"));
        assert!(s.progress.is_none());
        assert!(s.result.is_none());

        let r: ResultBody =
            serde_json::from_str(r#"{"video_url":"v1.mp4"}"#).expect("deserialize");
        assert!(r.images_used.is_none());
    }

    #[test]
    fn result_body_accepts_null_fields() {
        let r: ResultBody = serde_json::from_str(
            r#"{"video_url":"v1.mp4","audio_url":null,"script":"Once","images_used":null}"#,
        )
        .expect("null fields should not reject the payload");
        assert_eq!(r.video_url.as_deref(), Some("v1.mp4"));
        assert_eq!(r.script.as_deref(), Some("Once"));
        assert!(r.audio_url.is_none());
        assert!(r.images_used.is_none());
    }
}
