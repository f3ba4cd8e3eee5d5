//! The remote conversion service, seen from the client.
//!
//! [`ConversionService`] is the seam between the orchestrator and the
//! network. The orchestrator only ever holds an `Arc<dyn ConversionService>`,
//! so tests drive it with a scripted in-memory implementation and the CLI
//! plugs in [`HttpConversionService`].
//!
//! ## Endpoints
//!
//! ```text
//! POST {api}/upload                  multipart file      → task id
//! POST {api}/convert                 {task_id, config}   → ack
//! GET  {api}/progress/{id}                               → ProgressReport
//! GET  {api}/result/{id}                                 → ResultResponse
//! GET  {api}/download/{id}                               → markdown bytes
//! GET  {api}/download-images/{id}                        → zip bytes
//! GET  {api}/gpu-status                                  → GpuStatus
//! GET  {cfg}/config-presets                              → [PresetEntry]
//! POST {cfg}/validate-config         config              → ValidationReport
//! POST {cfg}/check-compatibility     config              → CompatibilityReport
//! POST {cfg}/auto-fix-config         config              → AutoFixReport
//! ```

pub mod http;

pub use http::HttpConversionService;

use crate::error::ClientError;
use crate::job_config::shape::ConfigShape;
use crate::orchestrator::SelectedFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Everything the client needs from the conversion service.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Upload a PDF and return the task id the service assigned to it.
    async fn upload(&self, file: &SelectedFile) -> Result<String, ClientError>;

    /// Start converting an uploaded file with `config` (already in wire shape).
    async fn convert(&self, task_id: &str, config: &Value) -> Result<ConvertAck, ClientError>;

    async fn progress(&self, task_id: &str) -> Result<ProgressReport, ClientError>;

    async fn result(&self, task_id: &str) -> Result<ResultResponse, ClientError>;

    async fn download(&self, task_id: &str, kind: ArtifactKind) -> Result<Artifact, ClientError>;

    async fn gpu_status(&self) -> Result<GpuStatus, ClientError>;

    async fn presets(&self) -> Result<Vec<PresetEntry>, ClientError>;

    async fn validate_config(&self, config: &Value) -> Result<ValidationReport, ClientError>;

    async fn check_compatibility(&self, config: &Value)
        -> Result<CompatibilityReport, ClientError>;

    async fn auto_fix_config(&self, config: &Value) -> Result<AutoFixReport, ClientError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

/// Reply to `/convert`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertAck {
    #[serde(default)]
    pub message: Option<String>,
    /// The shape the service says it read the configuration as, if it says.
    #[serde(default, alias = "config_version")]
    pub shape: Option<ConfigShape>,
}

/// Job status as reported by `/progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "processing", alias = "pending", alias = "queued")]
    Running,
    Completed,
    Failed,
    /// Any status string this client does not know. Treated as running.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One poll of `/progress/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub status: JobStatus,
    /// Percentage as the service reports it, possibly fractional.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressReport {
    pub fn running(progress: f64) -> Self {
        Self {
            status: JobStatus::Running,
            progress,
            error: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: JobStatus::Completed,
            progress: 100.0,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 0.0,
            error: Some(error.into()),
        }
    }

    /// The reported progress as a whole percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.progress.is_nan() {
            return 0;
        }
        self.progress.clamp(0.0, 100.0).round() as u8
    }
}

fn default_true() -> bool {
    true
}

/// Reply to `/result/{id}`.
///
/// Older services send the text as `text_preview` and omit `success`; both
/// forms are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, alias = "text_preview")]
    pub content: Option<String>,
    #[serde(default)]
    pub has_images: bool,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply to `/gpu-status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuStatus {
    pub available: bool,
    pub device_count: u32,
    pub device_name: Option<String>,
    /// GiB.
    pub memory_total: Option<f64>,
    pub memory_used: Option<f64>,
    pub memory_free: Option<f64>,
    pub cuda_version: Option<String>,
    pub pytorch_version: Option<String>,
}

/// One raw entry of `/config-presets`. `config` is parsed later by the
/// preset catalog, which tolerates either wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: Value,
}

/// Reply to `/validate-config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Reply to `/check-compatibility`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub migration_needed: bool,
    /// Free-form: a string from some services, an object from others.
    #[serde(default)]
    pub summary: Option<Value>,
}

/// Reply to `/auto-fix-config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoFixReport {
    #[serde(default)]
    pub original_config: Value,
    pub fixed_config: Value,
    #[serde(default)]
    pub compatible: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub summary: Option<Value>,
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// Which downloadable artifact of a completed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The converted Markdown document.
    Markdown,
    /// A zip archive of the extracted images.
    Images,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Images => "images",
        }
    }

    /// File name to use when the service does not suggest one.
    pub fn fallback_file_name(self, task_id: &str) -> String {
        match self {
            Self::Markdown => format!("converted_{task_id}.md"),
            Self::Images => format!("images_{task_id}.zip"),
        }
    }
}

/// A downloaded artifact, fully buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Suggested file name (from `Content-Disposition`, or a fallback).
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Write the artifact to `path`, creating parent directories.
    ///
    /// Writes a sibling temp file first and renames it into place, so a
    /// reader never sees a partial file.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let path = path.as_ref();
        let write_err = |e| ClientError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
        Ok(())
    }
}
