//! Error types for the pdf2md-remote library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`ConfigError`]: raised by the pure configuration layer
//!   ([`crate::job_config`]): mode-purity violations, invariant failures,
//!   unknown presets, unreadable configuration shapes. No I/O is involved in
//!   producing one, except that remote validation failures are carried in
//!   [`ConfigError::Invalid`] verbatim.
//!
//! * [`ClientError`]: raised by the task orchestrator and the service
//!   client: rejected input files, failed uploads, rejected conversions, poll
//!   transport failures. Wraps [`ConfigError`] when a configuration problem
//!   blocks a conversion.
//!
//! [`ClientError::category`] folds every variant onto the small taxonomy a
//! user interface needs to decide how to present it.

use crate::orchestrator::Phase;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building, reconciling or validating a
/// conversion configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Two settings conflict and no normalisation rule can resolve them.
    #[error("Conflicting settings for '{field}': {reason}")]
    Conflict { field: String, reason: String },

    /// An edit targeted a field that does not exist in the active mode.
    #[error("Field '{field}' does not belong to {mode} mode")]
    ForeignField { field: String, mode: String },

    /// Local invariant check or remote validation failed.
    #[error("Invalid configuration: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },

    /// No preset with this name exists in the loaded catalog.
    #[error("Preset not found: '{name}'")]
    PresetNotFound { name: String },

    /// The preset catalog was queried before it was loaded.
    #[error("Preset catalog has not been loaded")]
    CatalogNotLoaded,

    /// A configuration object matched neither the legacy nor the current shape.
    #[error("Unrecognised configuration shape")]
    UnrecognizedShape,

    /// The object had a recognisable shape but its field values did not parse.
    #[error("Malformed configuration: {0}")]
    Malformed(String),

    /// A field path used in an edit does not name any known field.
    #[error("Unknown configuration field '{path}'")]
    UnknownField { path: String },

    /// A field path is known but the supplied value cannot be parsed for it.
    #[error("Bad value '{value}' for '{path}': {reason}")]
    BadValue {
        path: String,
        value: String,
        reason: String,
    },
}

/// All task-level errors returned by the pdf2md-remote library.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Selected file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Neither the content type nor the extension indicates a PDF.
    #[error("'{name}' is not a PDF file")]
    NotAPdf { name: String },

    /// The file exceeds the configured maximum upload size.
    #[error("'{name}' is {size} bytes, larger than the {max} byte limit")]
    FileTooLarge { name: String, size: u64, max: u64 },

    /// A conversion was requested before a conversion mode was chosen.
    #[error("Select a conversion mode before starting")]
    NoModeSelected,

    // ── State machine errors ──────────────────────────────────────────────
    /// The requested operation is not allowed in the current phase.
    #[error("Cannot {operation} while {phase}")]
    InvalidTransition { operation: &'static str, phase: Phase },

    // ── Service errors ────────────────────────────────────────────────────
    /// The upload request failed or the service refused the file.
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    /// The service refused to start the conversion.
    #[error("Conversion rejected: {reason}")]
    ConvertRejected { reason: String },

    /// A progress poll could not reach the service or could not be decoded.
    #[error("Lost contact with task {task_id}: {reason}")]
    PollTransport { task_id: String, reason: String },

    /// The job completed but its result could not be fetched.
    #[error("Result for task {task_id} unavailable: {reason}")]
    ResultUnavailable { task_id: String, reason: String },

    /// An artifact download failed.
    #[error("Failed to download {artifact} for task {task_id}: {reason}")]
    DownloadFailed {
        task_id: String,
        artifact: &'static str,
        reason: String,
    },

    /// Any other endpoint (presets, validation, GPU status) failed.
    #[error("Request to {endpoint} failed: {reason}")]
    Request {
        endpoint: &'static str,
        reason: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The configuration blocks the conversion.
    #[error(transparent)]
    Config(#[from] ConfigError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a downloaded artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Client settings ───────────────────────────────────────────────────
    /// A [`crate::ClientConfig`] value is out of range.
    #[error("Invalid client configuration: {0}")]
    InvalidClientConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ClientError`] for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad file type or size, or no mode selected. Recovered locally.
    InputRejected,
    /// Upload failed; the task is back in `fileSelected`.
    UploadFailed,
    /// Conversion refused; the task is back in `fileSelected`.
    ConvertRejected,
    /// Local or remote configuration validation failed.
    ConfigInvalid,
    /// Progress polling failed; the task is terminal.
    PollTransportError,
    /// Unknown preset name (or catalog not loaded).
    PresetNotFound,
    /// Any other network or protocol failure.
    Transport,
    /// Misuse of the state machine or an internal fault.
    Internal,
}

impl ClientError {
    /// Map this error onto the presentation taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::NotAPdf { .. }
            | Self::FileTooLarge { .. }
            | Self::NoModeSelected => ErrorCategory::InputRejected,
            Self::UploadFailed { .. } => ErrorCategory::UploadFailed,
            Self::ConvertRejected { .. } => ErrorCategory::ConvertRejected,
            Self::PollTransport { .. } => ErrorCategory::PollTransportError,
            Self::Config(ConfigError::PresetNotFound { .. })
            | Self::Config(ConfigError::CatalogNotLoaded) => ErrorCategory::PresetNotFound,
            Self::Config(_) => ErrorCategory::ConfigInvalid,
            Self::ResultUnavailable { .. } | Self::DownloadFailed { .. } | Self::Request { .. } => {
                ErrorCategory::Transport
            }
            Self::InvalidTransition { .. }
            | Self::OutputWriteFailed { .. }
            | Self::InvalidClientConfig(_)
            | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// True for errors that were caught before any network call was made.
    pub fn is_input_rejected(&self) -> bool {
        self.category() == ErrorCategory::InputRejected
    }
}
