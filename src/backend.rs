use std::time::{Duration, Instant};

use reqwest::{multipart, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::document::Document;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with a non-success status
    #[error("Server error {status}: {message}")]
    Status { status: u16, message: String },
    /// The request went out but nothing came back
    #[error("No response from server at {url}. Is the backend running?")]
    Unreachable { url: String },
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The request could not be built or sent
    #[error("Could not send request: {0}")]
    Request(String),
    #[error("Unexpected response from server: {0}")]
    Decode(String),
}

impl BackendError {
    /// Failures that say nothing about the backend except that it did not answer
    pub fn is_connectivity_loss(&self) -> bool {
        matches!(self, BackendError::Unreachable { .. } | BackendError::Timeout(_))
    }

    fn from_reqwest(err: reqwest::Error, base_url: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else if err.is_builder() {
            BackendError::Request(err.to_string())
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            BackendError::Unreachable { url: base_url.to_string() }
        } else {
            BackendError::Request(err.to_string())
        }
    }
}

#[derive(Serialize)]
struct AskRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    ask_timeout: Option<Duration>,
    probe_timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            ask_timeout: None,
            probe_timeout: Duration::from_secs(3),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut client = Self::new(&config.base_url);
        client.ask_timeout = config.ask_timeout();
        client.probe_timeout = config.probe_timeout();
        client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn upload(&self, document: &Document) -> Result<UploadReceipt, BackendError> {
        let url = format!("{}/upload", self.base_url);
        let started = Instant::now();

        let part = multipart::Part::bytes(document.content.clone())
            .file_name(document.name.clone())
            .mime_str(document.mime_type())
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        tracing::info!(file = %document.name, size = document.size, "uploading document");
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_err(e, Duration::ZERO))?;
        let response = check_status(response).await?;

        // The backend may answer with an empty or non-JSON body on success
        let body = response.text().await.map_err(|e| self.map_err(e, Duration::ZERO))?;
        let receipt = serde_json::from_str::<UploadReceipt>(&body).unwrap_or_default();
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "document uploaded");
        Ok(receipt)
    }

    pub async fn ask(&self, text: &str) -> Result<Answer, BackendError> {
        let url = format!("{}/ask", self.base_url);
        let started = Instant::now();

        let mut request = self.client.post(&url).json(&AskRequest { text });
        if let Some(timeout) = self.ask_timeout {
            request = request.timeout(timeout);
        }

        tracing::info!(chars = text.chars().count(), "asking question");
        let timeout = self.ask_timeout.unwrap_or_default();
        let response = request.send().await.map_err(|e| self.map_err(e, timeout))?;
        let response = check_status(response).await?;

        let mut answer: Answer = response
            .json()
            .await
            .map_err(|e| self.map_err(e, timeout))?;
        answer.elapsed = started.elapsed();
        tracing::info!(
            elapsed_ms = answer.elapsed.as_millis() as u64,
            sources = answer.sources.len(),
            "answer received"
        );
        Ok(answer)
    }

    pub async fn clear(&self) -> Result<(), BackendError> {
        let url = format!("{}/clear", self.base_url);

        tracing::info!("clearing backend session");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| self.map_err(e, Duration::ZERO))?;
        check_status(response).await?;
        Ok(())
    }

    /// Liveness check against the backend root; any 2xx counts
    pub async fn probe(&self) -> Result<(), BackendError> {
        let url = format!("{}/", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| self.map_err(e, self.probe_timeout))?;

        if response.status().is_success() {
            tracing::debug!("probe ok");
            Ok(())
        } else {
            let status = response.status();
            tracing::debug!(%status, "probe failed");
            Err(BackendError::Status {
                status: status.as_u16(),
                message: reason(status),
            })
        }
    }

    fn map_err(&self, err: reqwest::Error, timeout: Duration) -> BackendError {
        let mapped = BackendError::from_reqwest(err, &self.base_url, timeout);
        tracing::warn!(error = %mapped, "backend request failed");
        mapped
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    tracing::warn!(%status, %message, "backend returned an error");
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Prefer the `detail` field of a JSON error body, then the raw body text
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match parsed.detail {
            serde_json::Value::String(s) if !s.is_empty() => return s,
            serde_json::Value::Null => {}
            other => return other.to_string(),
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        reason(status)
    } else {
        trimmed.to_string()
    }
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown error").to_string()
}
