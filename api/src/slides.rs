//! Slide-rendering service client (SlideSpeak slide-by-slide generation).
//!
//! Rendering is asynchronous: `submit` returns a task id and the caller polls
//! `status` until the task reaches a terminal state (see `services::poller`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SlidesConfig;

#[derive(Debug, thiserror::Error)]
pub enum SlidesError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("slide API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// One slide as requested from the renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideDescriptor {
    pub title: String,
    pub layout: String,
    pub item_amount: String,
    pub content_description: String,
}

/// Status tag reported by the renderer for a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Sent,
    Started,
    Success,
    Failed,
    Error,
    Unknown(String),
}

impl JobStatus {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "PENDING" => JobStatus::Pending,
            "PROCESSING" => JobStatus::Processing,
            "SENT" => JobStatus::Sent,
            "STARTED" => JobStatus::Started,
            "SUCCESS" => JobStatus::Success,
            "FAILED" | "FAILURE" => JobStatus::Failed,
            "ERROR" => JobStatus::Error,
            _ => JobStatus::Unknown(tag.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
impl JobStatusReport {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            result_url: None,
            error: None,
        }
    }

    pub fn success(url: &str) -> Self {
        Self {
            status: JobStatus::Success,
            result_url: Some(url.to_string()),
            error: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            status: JobStatus::Failed,
            result_url: None,
            error: Some(message.to_string()),
        }
    }
}

#[async_trait]
pub trait SlideRenderer: Send + Sync {
    /// Submit a deck for rendering and return the job id.
    async fn submit(&self, slides: &[SlideDescriptor]) -> Result<String, SlidesError>;

    async fn status(&self, job_id: &str) -> Result<JobStatusReport, SlidesError>;
}

#[derive(Clone)]
pub struct SlideSpeakClient {
    http: Client,
    api_key: String,
    base_url: String,
    template: String,
}

impl SlideSpeakClient {
    pub fn new(config: &SlidesConfig) -> Self {
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            template: config.template.clone(),
        }
    }

    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, SlidesError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(SlidesError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    template: &'a str,
    slides: &'a [SlideDescriptor],
}

#[derive(Deserialize)]
struct SubmitResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    task_status: String,
    #[serde(default)]
    task_result: Option<Value>,
    #[serde(default)]
    task_info: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl From<StatusResponse> for JobStatusReport {
    fn from(resp: StatusResponse) -> Self {
        // The result is either `{"url": ...}` or the bare URL string.
        let result_url = match resp.task_result {
            Some(Value::String(url)) => Some(url),
            Some(Value::Object(map)) => map.get("url").and_then(Value::as_str).map(String::from),
            _ => None,
        };
        let error = resp.error.or_else(|| match resp.task_info {
            Some(Value::String(info)) => Some(info),
            Some(Value::Object(map)) => map.get("error").and_then(Value::as_str).map(String::from),
            _ => None,
        });

        Self {
            status: JobStatus::parse(&resp.task_status),
            result_url,
            error,
        }
    }
}

#[async_trait]
impl SlideRenderer for SlideSpeakClient {
    async fn submit(&self, slides: &[SlideDescriptor]) -> Result<String, SlidesError> {
        let resp = self
            .http
            .post(format!("{}/presentation/generate/slide-by-slide", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&SubmitRequest {
                template: &self.template,
                slides,
            })
            .send()
            .await?;

        let submitted: SubmitResponse = Self::ensure_success(resp).await?.json().await?;
        tracing::info!(job_id = %submitted.task_id, slides = slides.len(), "Submitted slide deck");
        Ok(submitted.task_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatusReport, SlidesError> {
        let resp = self
            .http
            .get(format!("{}/task_status/{}", self.base_url, job_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;

        let status: StatusResponse = Self::ensure_success(resp).await?.json().await?;
        Ok(status.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(value: Value) -> JobStatusReport {
        serde_json::from_value::<StatusResponse>(value).unwrap().into()
    }

    #[test]
    fn test_status_tags() {
        assert_eq!(JobStatus::parse("SUCCESS"), JobStatus::Success);
        assert_eq!(JobStatus::parse("pending"), JobStatus::Pending);
        assert_eq!(JobStatus::parse("FAILURE"), JobStatus::Failed);
        assert_eq!(
            JobStatus::parse("RETRY"),
            JobStatus::Unknown("RETRY".to_string())
        );
    }

    #[test]
    fn test_result_url_from_object_or_string() {
        let from_object = report(json!({
            "task_status": "SUCCESS",
            "task_result": {"url": "https://slides.example/deck.pptx"}
        }));
        assert_eq!(from_object, JobStatusReport::success("https://slides.example/deck.pptx"));

        let from_string = report(json!({
            "task_status": "SUCCESS",
            "task_result": "https://slides.example/other.pptx"
        }));
        assert_eq!(
            from_string.result_url.as_deref(),
            Some("https://slides.example/other.pptx")
        );
    }

    #[test]
    fn test_failure_message_is_carried() {
        let failed = report(json!({
            "task_status": "FAILED",
            "task_result": null,
            "task_info": {"error": "template not found"}
        }));
        assert_eq!(failed, JobStatusReport::failed("template not found"));
    }

    #[test]
    fn test_submit_body_layout() {
        let slides = vec![SlideDescriptor {
            title: "Photosynthesis".into(),
            layout: "items".into(),
            item_amount: "3".into(),
            content_description: "Light and dark reactions".into(),
        }];
        let body = SubmitRequest {
            template: "default",
            slides: &slides,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "template": "default",
                "slides": [{
                    "title": "Photosynthesis",
                    "layout": "items",
                    "item_amount": "3",
                    "content_description": "Light and dark reactions"
                }]
            })
        );
    }
}
