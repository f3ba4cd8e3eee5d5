//! Client settings: where the service lives and how the task is driven.
//!
//! These are the knobs of the *client*, not of the conversion. What the
//! service should do with a document is a [`crate::job_config::ConfigModel`];
//! how often to poll it and how big an upload may be is a [`ClientConfig`].
//!
//! Built via [`ClientConfig::builder()`]; setters clamp to sane ranges and
//! `build()` rejects what cannot be clamped.

use crate::error::ClientError;
use crate::job_config::shape::ConfigShape;
use std::time::Duration;

/// 100 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Settings for one [`crate::TaskOrchestrator`] and its service client.
///
/// # Example
/// ```rust
/// use pdf2md_remote::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .base_url("http://gpu-box:8001")
///     .poll_interval(Duration::from_millis(500))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme, host and port of the service. Default: `http://127.0.0.1:8001`.
    pub base_url: String,

    /// Path prefix of the task endpoints (upload, convert, progress...). Default: `/api`.
    pub api_prefix: String,

    /// Path prefix of the configuration endpoints (presets, validation). Default: `/api/v2`.
    pub config_api_prefix: String,

    /// Largest file accepted for upload, in bytes. Default: 100 MiB.
    ///
    /// Checked before any network call.
    pub max_file_size: u64,

    /// Cadence of the progress poll loop. Default: 1 s.
    pub poll_interval: Duration,

    /// Cadence of the elapsed-time clock. Range: 100 ms–1 s. Default: 250 ms.
    pub tick_interval: Duration,

    /// Timeout of each individual HTTP request. Default: 300 s.
    ///
    /// The poll loop as a whole has no deadline: it runs until the service
    /// reports a terminal status or a poll fails.
    pub request_timeout: Duration,

    /// How long a surfaced error notice stays visible. Default: 5 s.
    pub notice_ttl: Duration,

    /// Shape of the configuration sent with `/convert`. Default: current.
    pub wire_shape: ConfigShape,

    /// Ask the service to validate the configuration before converting. Default: false.
    pub validate_remotely: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".into(),
            api_prefix: "/api".into(),
            config_api_prefix: "/api/v2".into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            poll_interval: Duration::from_secs(1),
            tick_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(300),
            notice_ttl: Duration::from_secs(5),
            wire_shape: ConfigShape::Current,
            validate_remotely: false,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.api_prefix = normalize_prefix(prefix.into());
        self
    }

    pub fn config_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.config_api_prefix = normalize_prefix(prefix.into());
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.config.poll_interval = d.max(Duration::from_millis(10));
        self
    }

    pub fn tick_interval(mut self, d: Duration) -> Self {
        self.config.tick_interval = d.clamp(Duration::from_millis(100), Duration::from_secs(1));
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.config.request_timeout = d;
        self
    }

    pub fn notice_ttl(mut self, d: Duration) -> Self {
        self.config.notice_ttl = d;
        self
    }

    /// Send the legacy (`gpu_config`) shape instead of the current one.
    pub fn wire_shape(mut self, shape: ConfigShape) -> Self {
        self.config.wire_shape = match shape {
            ConfigShape::Unrecognized => ConfigShape::Current,
            other => other,
        };
        self
    }

    pub fn validate_remotely(mut self, v: bool) -> Self {
        self.config.validate_remotely = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let c = &self.config;
        let scheme_ok = c.base_url.starts_with("http://") || c.base_url.starts_with("https://");
        if !scheme_ok {
            return Err(ClientError::InvalidClientConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.max_file_size == 0 {
            return Err(ClientError::InvalidClientConfig(
                "max file size must be ≥ 1 byte".into(),
            ));
        }
        if c.request_timeout.is_zero() {
            return Err(ClientError::InvalidClientConfig(
                "request timeout must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

/// `api` → `/api`, `/api/` → `/api`, `` → ``.
fn normalize_prefix(prefix: String) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
