//! # pdf2md-remote
//!
//! Drive a remote PDF-to-Markdown conversion service from Rust: upload a PDF,
//! choose how it should be converted, follow the job until it finishes, and
//! fetch the Markdown (and extracted images) back.
//!
//! The service runs the conversion. This crate owns the client side: a
//! state machine for one job, a configuration layer that always yields a
//! single valid, mode-consistent configuration, and the poll/clock loops that
//! watch a job without a push channel.
//!
//! ## Overview
//!
//! ```text
//!  presets ─┐
//!  edits  ──┼─▶ ConfigReconciler ──▶ ConfigModel ──▶ TaskOrchestrator::start
//!  legacy ──┘     (pure)                                 │
//!                                                        ├─ 1. upload     POST /upload
//!                                                        ├─ 2. convert    POST /convert
//!                                                        ├─ 3. poll       GET  /progress/{id}  (every 1 s)
//!                                                        ├─ 4. clock      elapsed-time ticks
//!                                                        └─ 5. result     GET  /result/{id}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_remote::{ClientConfig, ConfigModel, ConversionMode, NoopObserver, TaskOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder().base_url("http://127.0.0.1:8001").build()?;
//!     let task = TaskOrchestrator::http(config, Arc::new(NoopObserver))?;
//!
//!     task.select_path("scan.pdf").await?;
//!     task.start(Some(&ConfigModel::defaults_for(ConversionMode::Ocr))).await?;
//!
//!     let done = task.wait_until_settled().await?;
//!     if let Some(result) = done.result {
//!         println!("{}", result.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-remote` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2md-remote = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod elapsed;
pub mod error;
pub mod job_config;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder};
pub use elapsed::{elapsed, format_elapsed, ElapsedTimeTracker};
pub use error::{ClientError, ConfigError, ErrorCategory};
pub use job_config::edit::{ConfigDraft, FieldEdit};
pub use job_config::preset::{Preset, PresetCatalog};
pub use job_config::reconcile::{ConfigReconciler, Intent};
pub use job_config::shape::{detect_shape, ConfigShape};
pub use job_config::validate::ConfigValidator;
pub use job_config::{ConfigModel, ConversionMode, OcrQuality, OutputFormat};
pub use orchestrator::{ConversionResult, Phase, SelectedFile, TaskOrchestrator, TaskSnapshot};
pub use progress::{NoopObserver, SharedObserver, TaskObserver};
pub use service::{ConversionService, HttpConversionService};
pub use stream::SnapshotStream;
