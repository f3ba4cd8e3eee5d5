//! Configuration validation: local fast-fail, then the service.
//!
//! The client knows only the invariants in
//! [`ConfigModel::local_violations`]. Anything beyond those is the service's
//! call, and its verdict is passed on verbatim. Auto-fixing is a separate,
//! explicit request; nothing here rewrites a configuration on its own.

use super::shape::{from_wire, to_wire, ConfigShape};
use super::ConfigModel;
use crate::error::{ClientError, ConfigError};
use crate::service::{AutoFixReport, CompatibilityReport, ConversionService, ValidationReport};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Where a validation verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    /// Local invariant check; the service was not contacted.
    Local,
    Remote,
}

/// Result of [`ConfigValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub report: ValidationReport,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.report.valid
    }

    /// `Ok(())` if valid, otherwise [`ConfigError::Invalid`] with the errors.
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.report.valid {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                errors: self.report.errors,
            })
        }
    }
}

/// Output of [`ConfigValidator::auto_fix`]. The caller decides whether to use
/// `config`.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoFixOutcome {
    pub config: ConfigModel,
    pub report: AutoFixReport,
}

/// Validates configurations against the local invariants and the service.
#[derive(Clone)]
pub struct ConfigValidator {
    service: Arc<dyn ConversionService>,
    shape: ConfigShape,
}

impl ConfigValidator {
    /// `shape` is the wire shape configurations are sent in.
    pub fn new(service: Arc<dyn ConversionService>, shape: ConfigShape) -> Self {
        Self { service, shape }
    }

    /// Validate `config`.
    ///
    /// A local violation short-circuits: the verdict is returned without any
    /// network call. Otherwise the service's report is returned as is.
    pub async fn validate(&self, config: &ConfigModel) -> Result<Verdict, ClientError> {
        let normalized = config.clone().normalized();
        let errors = normalized.local_violations();
        if !errors.is_empty() {
            debug!("Local validation failed: {}", errors.join("; "));
            return Ok(Verdict {
                report: ValidationReport {
                    valid: false,
                    errors,
                    ..Default::default()
                },
                source: VerdictSource::Local,
            });
        }

        let report = self
            .service
            .validate_config(&to_wire(&normalized, self.shape))
            .await?;
        Ok(Verdict {
            report,
            source: VerdictSource::Remote,
        })
    }

    /// Ask the service whether `config` is compatible with it, as is.
    pub async fn check_compatibility(
        &self,
        config: &ConfigModel,
    ) -> Result<CompatibilityReport, ClientError> {
        self.service
            .check_compatibility(&to_wire(config, self.shape))
            .await
    }

    /// Ask the service to repair `config` and parse the repaired version.
    pub async fn auto_fix(&self, config: &Value) -> Result<AutoFixOutcome, ClientError> {
        let report = self.service.auto_fix_config(config).await?;
        let fixed = unwrap_fixed_config(&report.fixed_config);
        let (config, shape) = from_wire(fixed)?;
        debug!("Service repaired configuration (read as {shape} shape)");
        Ok(AutoFixOutcome { config, report })
    }
}

/// Some service versions nest the repaired object one level deeper, under a
/// second `fixed_config` key.
fn unwrap_fixed_config(value: &Value) -> &Value {
    match value.get("fixed_config") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}
