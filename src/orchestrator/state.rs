//! Task state owned by the orchestrator, and the read-only views of it.

use super::file::SelectedFile;
use super::phase::Phase;
use crate::elapsed::ElapsedTimeTracker;
use crate::job_config::{ConfigModel, ConversionMode};
use crate::service::ResultResponse;
use serde::{Serialize, Serializer};
use std::time::Duration;
use tokio::time::Instant;

/// What a completed task produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionResult {
    /// The Markdown text.
    pub content: String,
    pub has_images: bool,
    pub image_count: u32,
    /// Output file name as the service named it.
    pub file_name: Option<String>,
    /// Server-side processing time in seconds, if reported.
    pub processing_time: Option<f64>,
}

impl ConversionResult {
    /// The Markdown artifact is always downloadable; the image archive only
    /// when images were extracted.
    pub fn images_available(&self) -> bool {
        self.has_images && self.image_count > 0
    }
}

impl From<ResultResponse> for ConversionResult {
    fn from(r: ResultResponse) -> Self {
        Self {
            content: r.content.unwrap_or_default(),
            has_images: r.has_images,
            image_count: r.image_count,
            file_name: r.file_name,
            processing_time: r.processing_time,
        }
    }
}

/// A user-visible message with the instant it was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notice {
    pub seq: u64,
    pub message: String,
    pub raised_at: Instant,
}

/// Mutable state of the single active task.
#[derive(Debug, Default)]
pub(crate) struct TaskState {
    pub phase: Phase,
    pub file: Option<SelectedFile>,
    pub task_id: Option<String>,
    pub config: Option<ConfigModel>,
    pub progress: u8,
    pub clock: ElapsedTimeTracker,
    pub result: Option<ConversionResult>,
    pub failure: Option<String>,
    pub fetching_result: bool,
    pub notice: Option<Notice>,
    pub notice_seq: u64,
    /// Bumped whenever the task is destroyed, so late async work for an old
    /// task can recognise itself.
    pub epoch: u64,
}

impl TaskState {
    /// Clear every task field; keep the counters running.
    pub fn clear(&mut self) {
        let epoch = self.epoch + 1;
        let notice_seq = self.notice_seq;
        *self = Self {
            epoch,
            notice_seq,
            ..Self::default()
        };
    }

    pub fn snapshot(&self, now: Instant, notice_ttl: Duration) -> TaskSnapshot {
        TaskSnapshot {
            phase: self.phase,
            task_id: self.task_id.clone(),
            file_name: self.file.as_ref().map(|f| f.name.clone()),
            file_size: self.file.as_ref().map(|f| f.size),
            mode: self.config.as_ref().map(ConfigModel::mode),
            progress: self.progress,
            elapsed: self.clock.elapsed(),
            started_at: self.clock.started_at(),
            completed_at: self.clock.frozen_at(),
            result: self.result.clone(),
            failure: self.failure.clone(),
            notice: self
                .notice
                .as_ref()
                .filter(|n| now.saturating_duration_since(n.raised_at) < notice_ttl)
                .map(|n| n.message.clone()),
            fetching_result: self.fetching_result,
        }
    }
}

fn secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Point-in-time view of the task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub phase: Phase,
    pub task_id: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    /// Mode of the configuration the task was started with.
    pub mode: Option<ConversionMode>,
    /// Last service-reported percentage.
    pub progress: u8,
    /// Live while polling; frozen once terminal.
    #[serde(rename = "elapsed_secs", serialize_with = "secs")]
    pub elapsed: Duration,
    /// When polling began.
    #[serde(skip)]
    pub started_at: Option<Instant>,
    /// When the task reached `completed` or `failed`.
    #[serde(skip)]
    pub completed_at: Option<Instant>,
    pub result: Option<ConversionResult>,
    /// Server error (or transport error) of a failed task.
    pub failure: Option<String>,
    /// Current user-visible message, if one is live.
    pub notice: Option<String>,
    /// The task completed and its result is being fetched.
    pub fetching_result: bool,
}

impl TaskSnapshot {
    /// Nothing more will happen without a user action: the task failed, or
    /// it completed and the result fetch has finished.
    pub fn is_settled(&self) -> bool {
        match self.phase {
            Phase::Failed => true,
            Phase::Completed => !self.fetching_result,
            _ => false,
        }
    }
}
