//! Conversion backend: the [`Converter`] seam and its CloudConvert client.
//!
//! ## Process lifecycle
//!
//! A conversion is a small state machine on the API side:
//!
//! ```text
//! POST /process ──▶ POST <process> (multipart upload, wait=true)
//!                      │
//!                      ├─ step != finished ──▶ GET <process>?wait=true
//!                      ▼
//!                  GET <output.url> ──▶ PNG bytes
//! ```
//!
//! The client never retries. Failures are classified by HTTP status into a
//! [`ConversionError`]; a `503` carries the server's `Retry-After` hint, which
//! is reported to the caller and otherwise ignored.

use crate::config::FallbackConfig;
use crate::error::{ConversionError, Svg2PngError};
use crate::output::AccountInfo;
use crate::pipeline::options::ConversionJob;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The external conversion capability.
///
/// The API key is passed per call so one converter can serve whatever key
/// the current [`crate::Settings`] hold.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert an uploaded file and return the output bytes.
    async fn convert(&self, api_key: &str, job: &ConversionJob) -> Result<Vec<u8>, ConversionError>;

    /// Look up the account the key belongs to.
    async fn account(&self, api_key: &str) -> Result<AccountInfo, ConversionError>;
}

/// HTTP client for the CloudConvert process API.
#[derive(Debug, Clone)]
pub struct CloudConvertClient {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct ProcessCreated {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ProcessStatus {
    #[serde(default)]
    step: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    output: Option<ProcessOutput>,
}

#[derive(Debug, Deserialize)]
struct ProcessOutput {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl CloudConvertClient {
    /// Build a client from the conversion config.
    ///
    /// No request timeout is set unless `config.api_timeout_secs` is.
    pub fn new(config: &FallbackConfig) -> Result<Self, Svg2PngError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| Svg2PngError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn create_process(&self, api_key: &str, job: &ConversionJob) -> Result<String, ConversionError> {
        let url = format!("{}/process", self.api_base);
        let body = serde_json::json!({
            "inputformat": job.input_format,
            "outputformat": job.output_format,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let created: ProcessCreated = check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        let process_url = absolute_url(&created.url);
        debug!("Created conversion process {}", process_url);
        Ok(process_url)
    }

    async fn start_process(&self, process_url: &str, job: &ConversionJob) -> Result<ProcessStatus, ConversionError> {
        let file = Part::bytes(job.bytes.clone())
            .file_name(job.file_name.clone())
            .mime_str(job.mime)
            .map_err(transport_error)?;

        let mut form = Form::new()
            .text("input", "upload")
            .text("outputformat", job.output_format)
            .text("timeout", job.timeout_secs.to_string())
            .text("wait", "true");
        for (name, value) in job.options.form_fields() {
            form = form.text(name, value);
        }
        let form = form.part("file", file);

        let response = self
            .http
            .post(process_url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?.json().await.map_err(transport_error)
    }

    async fn wait_process(&self, process_url: &str) -> Result<ProcessStatus, ConversionError> {
        let response = self
            .http
            .get(process_url)
            .query(&[("wait", "true")])
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?.json().await.map_err(transport_error)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ConversionError> {
        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let bytes = check(response).await?.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Converter for CloudConvertClient {
    async fn convert(&self, api_key: &str, job: &ConversionJob) -> Result<Vec<u8>, ConversionError> {
        let process_url = self.create_process(api_key, job).await?;

        let mut status = self.start_process(&process_url, job).await?;
        if status.step != "finished" && status.step != "error" {
            debug!("Process at step '{}', waiting", status.step);
            status = self.wait_process(&process_url).await?;
        }

        match status.step.as_str() {
            "finished" => {}
            "error" => {
                return Err(ConversionError::ConversionFailed {
                    message: status.message.unwrap_or_else(|| "unknown error".into()),
                })
            }
            other => {
                return Err(ConversionError::other(format!(
                    "process ended in unexpected step '{other}'"
                )))
            }
        }

        let output = status
            .output
            .ok_or_else(|| ConversionError::other("finished process has no output"))?;
        self.download(&absolute_url(&output.url)).await
    }

    async fn account(&self, api_key: &str) -> Result<AccountInfo, ConversionError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_base))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?.json().await.map_err(transport_error)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Pass successful responses through; classify everything else.
async fn check(response: Response) -> Result<Response, ConversionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(classify(status, retry_after, &body))
}

/// Map an unsuccessful API response to a [`ConversionError`].
pub(crate) fn classify(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> ConversionError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match status {
        StatusCode::BAD_REQUEST => ConversionError::BadRequest { message },
        StatusCode::UNPROCESSABLE_ENTITY => ConversionError::ConversionFailed { message },
        StatusCode::SERVICE_UNAVAILABLE => ConversionError::TemporarilyUnavailable {
            message,
            retry_after_secs,
        },
        other => ConversionError::other(format!("HTTP {}: {message}", other.as_u16())),
    }
}

fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed.error.or(parsed.message),
        Err(_) => Some(body.to_string()),
    }
}

fn transport_error(e: reqwest::Error) -> ConversionError {
    ConversionError::other(e.to_string())
}

/// The API hands out protocol-relative URLs (`//host/process/ID`).
fn absolute_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}
