//! Scripted in-memory conversion service shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pdf2md_remote::service::{
    Artifact, ArtifactKind, AutoFixReport, CompatibilityReport, ConvertAck, GpuStatus,
    PresetEntry, ProgressReport, ResultResponse, ValidationReport,
};
use pdf2md_remote::{ClientConfig, ClientError, ConversionService, SelectedFile};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Call counters, one per endpoint the tests care about.
#[derive(Debug, Default)]
pub struct Calls {
    pub upload: AtomicUsize,
    pub convert: AtomicUsize,
    pub progress: AtomicUsize,
    pub result: AtomicUsize,
    pub download: AtomicUsize,
    pub presets: AtomicUsize,
    pub validate: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// A service whose every reply is set up by the test.
///
/// Progress replies are consumed in order; once the queue is empty the last
/// reply repeats (or `running(0)` if there never was one).
pub struct ScriptedService {
    pub calls: Calls,
    pub task_id: String,
    pub upload_error: Mutex<Option<String>>,
    pub convert_error: Mutex<Option<String>>,
    /// How long `upload` takes before answering.
    pub upload_delay: Mutex<Option<Duration>>,
    pub convert_delay: Mutex<Option<Duration>>,
    pub progress: Mutex<VecDeque<Result<ProgressReport, String>>>,
    last_progress: Mutex<Option<ProgressReport>>,
    pub result: Mutex<Result<ResultResponse, String>>,
    pub gpu: Mutex<GpuStatus>,
    pub presets: Mutex<Vec<PresetEntry>>,
    pub validation: Mutex<ValidationReport>,
    pub last_config: Mutex<Option<Value>>,
}

impl ScriptedService {
    pub fn new(task_id: &str) -> Self {
        Self {
            calls: Calls::default(),
            task_id: task_id.to_string(),
            upload_error: Mutex::new(None),
            convert_error: Mutex::new(None),
            upload_delay: Mutex::new(None),
            convert_delay: Mutex::new(None),
            progress: Mutex::new(VecDeque::new()),
            last_progress: Mutex::new(None),
            result: Mutex::new(Ok(result_with("# Converted\n", 0))),
            gpu: Mutex::new(GpuStatus::default()),
            presets: Mutex::new(Vec::new()),
            validation: Mutex::new(ValidationReport {
                valid: true,
                ..Default::default()
            }),
            last_config: Mutex::new(None),
        }
    }

    pub fn script_progress(&self, replies: impl IntoIterator<Item = ProgressReport>) {
        self.progress
            .lock()
            .unwrap()
            .extend(replies.into_iter().map(Ok));
    }

    pub fn script_progress_error(&self, reason: &str) {
        self.progress
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }
}

pub fn result_with(content: &str, images: u32) -> ResultResponse {
    ResultResponse {
        success: true,
        content: Some(content.to_string()),
        has_images: images > 0,
        image_count: images,
        file_name: Some("converted.md".into()),
        processing_time: Some(1.5),
        error: None,
    }
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client configuration suited to paused-time tests.
pub fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .base_url("http://scripted.invalid")
        .build()
        .unwrap()
}

/// An in-memory PDF of `size` bytes.
pub fn pdf(name: &str, size: usize) -> SelectedFile {
    let mut bytes = vec![0u8; size];
    let magic = b"%PDF-1.7";
    let n = magic.len().min(size);
    bytes[..n].copy_from_slice(&magic[..n]);
    SelectedFile::from_bytes(name, Some("application/pdf".into()), bytes)
}

#[async_trait]
impl ConversionService for ScriptedService {
    async fn upload(&self, _file: &SelectedFile) -> Result<String, ClientError> {
        self.calls.upload.fetch_add(1, Ordering::SeqCst);
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.upload_error.lock().unwrap().clone() {
            Some(reason) => Err(ClientError::UploadFailed { reason }),
            None => Ok(self.task_id.clone()),
        }
    }

    async fn convert(&self, _task_id: &str, config: &Value) -> Result<ConvertAck, ClientError> {
        self.calls.convert.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().unwrap() = Some(config.clone());
        let delay = *self.convert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.convert_error.lock().unwrap().clone() {
            Some(reason) => Err(ClientError::ConvertRejected { reason }),
            None => Ok(ConvertAck::default()),
        }
    }

    async fn progress(&self, task_id: &str) -> Result<ProgressReport, ClientError> {
        self.calls.progress.fetch_add(1, Ordering::SeqCst);
        let next = self.progress.lock().unwrap().pop_front();
        match next {
            Some(Ok(report)) => {
                *self.last_progress.lock().unwrap() = Some(report.clone());
                Ok(report)
            }
            Some(Err(reason)) => Err(ClientError::PollTransport {
                task_id: task_id.to_string(),
                reason,
            }),
            None => Ok(self
                .last_progress
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| ProgressReport::running(0.0))),
        }
    }

    async fn result(&self, task_id: &str) -> Result<ResultResponse, ClientError> {
        self.calls.result.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .clone()
            .map_err(|reason| ClientError::ResultUnavailable {
                task_id: task_id.to_string(),
                reason,
            })
    }

    async fn download(&self, task_id: &str, kind: ArtifactKind) -> Result<Artifact, ClientError> {
        self.calls.download.fetch_add(1, Ordering::SeqCst);
        let bytes = match kind {
            ArtifactKind::Markdown => b"# Converted\n".to_vec(),
            ArtifactKind::Images => b"PK\x03\x04".to_vec(),
        };
        Ok(Artifact {
            kind,
            file_name: kind.fallback_file_name(task_id),
            bytes,
        })
    }

    async fn gpu_status(&self) -> Result<GpuStatus, ClientError> {
        Ok(self.gpu.lock().unwrap().clone())
    }

    async fn presets(&self) -> Result<Vec<PresetEntry>, ClientError> {
        self.calls.presets.fetch_add(1, Ordering::SeqCst);
        Ok(self.presets.lock().unwrap().clone())
    }

    async fn validate_config(&self, _config: &Value) -> Result<ValidationReport, ClientError> {
        self.calls.validate.fetch_add(1, Ordering::SeqCst);
        Ok(self.validation.lock().unwrap().clone())
    }

    async fn check_compatibility(
        &self,
        _config: &Value,
    ) -> Result<CompatibilityReport, ClientError> {
        Ok(CompatibilityReport {
            compatible: true,
            ..Default::default()
        })
    }

    async fn auto_fix_config(&self, config: &Value) -> Result<AutoFixReport, ClientError> {
        let mut fixed = config.clone();
        if let Some(obj) = fixed.as_object_mut() {
            obj.retain(|k, _| !k.starts_with("ocr_") && k != "target_languages");
        }
        Ok(AutoFixReport {
            original_config: config.clone(),
            fixed_config: serde_json::json!({ "fixed_config": fixed }),
            compatible: true,
            issues: vec!["removed OCR fields from a marker configuration".into()],
            ..Default::default()
        })
    }
}
