//! [`ConversionService`] over HTTP, using `reqwest`.
//!
//! Every non-2xx response is turned into a `ClientError` whose reason is the
//! service's own message when it sent one (FastAPI `detail`, or a `message` /
//! `error` field), falling back to the HTTP status line.

use super::{
    Artifact, ArtifactKind, AutoFixReport, CompatibilityReport, ConversionService, ConvertAck,
    GpuStatus, PresetEntry, ProgressReport, ResultResponse, ValidationReport,
};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::orchestrator::SelectedFile;
use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

static RE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'')?"?([^";]+)"?"#).unwrap());

/// HTTP client for the conversion service.
#[derive(Debug, Clone)]
pub struct HttpConversionService {
    client: Client,
    api_base: String,
    config_api_base: String,
}

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default = "super::default_true")]
    success: bool,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ConvertReply {
    #[serde(default = "super::default_true")]
    success: bool,
    #[serde(flatten)]
    ack: ConvertAck,
}

#[derive(Deserialize)]
struct PresetsReply {
    #[serde(default)]
    presets: Vec<PresetEntry>,
}

impl HttpConversionService {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Internal(format!("Failed to build HTTP client: {e}")))?;
        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            api_base: format!("{base}{}", config.api_prefix),
            config_api_base: format!("{base}{}", config.config_api_prefix),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn config_api(&self, path: &str) -> String {
        format!("{}{path}", self.config_api_base)
    }

    /// Send a request and return the response if it is 2xx, or a reason.
    async fn send(&self, request: RequestBuilder) -> Result<Response, String> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_reason(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, String> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| format!("unexpected response body: {e}"))
    }
}

/// Best human-readable reason for a failed response.
fn error_reason(status: reqwest::StatusCode, body: &str) -> String {
    let from_body = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "message", "error"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).map(String::from))
    });
    from_body.unwrap_or_else(|| format!("HTTP {status}"))
}

/// File name suggested by a `Content-Disposition` header value.
fn disposition_file_name(header: &str) -> Option<String> {
    RE_FILENAME
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ConversionService for HttpConversionService {
    async fn upload(&self, file: &SelectedFile) -> Result<String, ClientError> {
        let bytes = file.read_bytes().await?;
        info!("Uploading {} ({} bytes)", file.name, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str("application/pdf")
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        let form = Form::new().part("file", part);

        let reply: UploadReply = self
            .send_json(self.client.post(self.api("/upload")).multipart(form))
            .await
            .map_err(|reason| ClientError::UploadFailed { reason })?;

        match (reply.success, reply.task_id) {
            (true, Some(id)) if !id.is_empty() => {
                debug!("Upload accepted, task id {id}");
                Ok(id)
            }
            (_, _) => Err(ClientError::UploadFailed {
                reason: reply
                    .message
                    .unwrap_or_else(|| "service did not return a task id".into()),
            }),
        }
    }

    async fn convert(&self, task_id: &str, config: &Value) -> Result<ConvertAck, ClientError> {
        let body = serde_json::json!({ "task_id": task_id, "config": config });
        let reply: ConvertReply = self
            .send_json(self.client.post(self.api("/convert")).json(&body))
            .await
            .map_err(|reason| ClientError::ConvertRejected { reason })?;

        if !reply.success {
            return Err(ClientError::ConvertRejected {
                reason: reply
                    .ack
                    .message
                    .unwrap_or_else(|| "service refused the conversion".into()),
            });
        }
        Ok(reply.ack)
    }

    async fn progress(&self, task_id: &str) -> Result<ProgressReport, ClientError> {
        self.send_json(self.client.get(self.api(&format!("/progress/{task_id}"))))
            .await
            .map_err(|reason| ClientError::PollTransport {
                task_id: task_id.to_string(),
                reason,
            })
    }

    async fn result(&self, task_id: &str) -> Result<ResultResponse, ClientError> {
        let unavailable = |reason| ClientError::ResultUnavailable {
            task_id: task_id.to_string(),
            reason,
        };
        let reply: ResultResponse = self
            .send_json(self.client.get(self.api(&format!("/result/{task_id}"))))
            .await
            .map_err(unavailable)?;
        if !reply.success {
            return Err(unavailable(
                reply.error.unwrap_or_else(|| "service reported no result".into()),
            ));
        }
        Ok(reply)
    }

    async fn download(&self, task_id: &str, kind: ArtifactKind) -> Result<Artifact, ClientError> {
        let failed = |reason| ClientError::DownloadFailed {
            task_id: task_id.to_string(),
            artifact: kind.label(),
            reason,
        };
        let path = match kind {
            ArtifactKind::Markdown => format!("/download/{task_id}"),
            ArtifactKind::Images => format!("/download-images/{task_id}"),
        };

        let response = self
            .send(self.client.get(self.api(&path)))
            .await
            .map_err(failed)?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name)
            .unwrap_or_else(|| kind.fallback_file_name(task_id));

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            bytes.extend_from_slice(&chunk);
        }

        debug!("Downloaded {} ({} bytes)", file_name, bytes.len());
        Ok(Artifact {
            kind,
            file_name,
            bytes,
        })
    }

    async fn gpu_status(&self) -> Result<GpuStatus, ClientError> {
        self.send_json(self.client.get(self.api("/gpu-status")))
            .await
            .map_err(|reason| ClientError::Request {
                endpoint: "gpu-status",
                reason,
            })
    }

    async fn presets(&self) -> Result<Vec<PresetEntry>, ClientError> {
        let reply: PresetsReply = self
            .send_json(self.client.get(self.config_api("/config-presets")))
            .await
            .map_err(|reason| ClientError::Request {
                endpoint: "config-presets",
                reason,
            })?;
        Ok(reply.presets)
    }

    async fn validate_config(&self, config: &Value) -> Result<ValidationReport, ClientError> {
        self.send_json(self.client.post(self.config_api("/validate-config")).json(config))
            .await
            .map_err(|reason| ClientError::Request {
                endpoint: "validate-config",
                reason,
            })
    }

    async fn check_compatibility(
        &self,
        config: &Value,
    ) -> Result<CompatibilityReport, ClientError> {
        self.send_json(
            self.client
                .post(self.config_api("/check-compatibility"))
                .json(config),
        )
        .await
        .map_err(|reason| ClientError::Request {
            endpoint: "check-compatibility",
            reason,
        })
    }

    async fn auto_fix_config(&self, config: &Value) -> Result<AutoFixReport, ClientError> {
        self.send_json(self.client.post(self.config_api("/auto-fix-config")).json(config))
            .await
            .map_err(|reason| ClientError::Request {
                endpoint: "auto-fix-config",
                reason,
            })
    }
}
