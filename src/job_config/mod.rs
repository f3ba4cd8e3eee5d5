//! Conversion configuration: the value the service receives with `/convert`.
//!
//! A [`ConfigModel`] is a tagged value: either a marker-mode configuration
//! (text PDFs, optional GPU acceleration) or an OCR-mode configuration
//! (scanned PDFs). The two modes share nothing but the output format, so the
//! type makes mode purity structural: a marker config cannot carry OCR fields
//! and vice versa.
//!
//! ## Data Flow
//!
//! ```text
//! user intent ──▶ reconcile ──▶ normalise ──▶ local check ──▶ (remote validate) ──▶ /convert
//!                 (pure)        (pure)        (pure)          (optional I/O)
//! ```
//!
//! 1. [`shape`]     : detect and convert between the legacy and current wire shapes
//! 2. [`edit`]      : typed single-field edits and partial drafts
//! 3. [`preset`]    : read-through cache of named templates
//! 4. [`reconcile`] : intent → next valid configuration
//! 5. [`validate`]  : local fast-fail plus the service's validation endpoints
//! 6. [`advice`]    : human-readable summary and tuning hints

pub mod advice;
pub mod edit;
pub mod preset;
pub mod reconcile;
pub mod shape;
pub mod validate;

use crate::error::ConfigError;
use crate::service::GpuStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which conversion engine the service should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Layout-aware extraction for PDFs with a text layer.
    Marker,
    /// Image OCR for scanned PDFs.
    Ocr,
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marker => write!(f, "marker"),
            Self::Ocr => write!(f, "ocr"),
        }
    }
}

impl FromStr for ConversionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marker" => Ok(Self::Marker),
            "ocr" => Ok(Self::Ocr),
            other => Err(ConfigError::BadValue {
                path: "conversion_mode".into(),
                value: other.to_string(),
                reason: "expected 'marker' or 'ocr'".into(),
            }),
        }
    }
}

/// Output document format. The service currently only produces Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(ConfigError::BadValue {
                path: "output_format".into(),
                value: other.to_string(),
                reason: "only 'markdown' is supported".into(),
            }),
        }
    }
}

/// OCR speed/accuracy trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrQuality {
    Fast,
    #[default]
    Balanced,
    Accurate,
}

impl fmt::Display for OcrQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Balanced => write!(f, "balanced"),
            Self::Accurate => write!(f, "accurate"),
        }
    }
}

impl FromStr for OcrQuality {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "accurate" => Ok(Self::Accurate),
            other => Err(ConfigError::BadValue {
                path: "ocr_quality".into(),
                value: other.to_string(),
                reason: "expected fast, balanced or accurate".into(),
            }),
        }
    }
}

/// GPU settings for marker mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuSettings {
    pub enabled: bool,
    /// Number of GPU devices. Must be ≥ 1.
    pub num_devices: u32,
    /// Number of worker processes. Must be ≥ 1.
    pub num_workers: u32,
    pub torch_device: String,
    pub cuda_visible_devices: String,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            num_devices: 1,
            num_workers: 4,
            torch_device: "cuda".into(),
            cuda_visible_devices: "0".into(),
        }
    }
}

/// Marker-mode fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerOptions {
    pub output_format: OutputFormat,
    pub use_llm: bool,
    pub force_ocr: bool,
    pub strip_existing_ocr: bool,
    pub save_images: bool,
    pub format_lines: bool,
    /// When set, `save_images` is forced off during normalisation.
    pub disable_image_extraction: bool,
    pub gpu: GpuSettings,
}

impl Default for MarkerOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Markdown,
            use_llm: false,
            force_ocr: false,
            strip_existing_ocr: true,
            save_images: false,
            format_lines: false,
            disable_image_extraction: true,
            gpu: GpuSettings::default(),
        }
    }
}

/// OCR-mode fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrOptions {
    pub output_format: OutputFormat,
    pub enhance_quality: bool,
    pub language_detection: bool,
    pub document_type_detection: bool,
    pub ocr_quality: OcrQuality,
    /// Tesseract-style language codes, in priority order. Never empty.
    pub target_languages: Vec<String>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Markdown,
            enhance_quality: true,
            language_detection: true,
            document_type_detection: true,
            ocr_quality: OcrQuality::Balanced,
            target_languages: vec!["chi_sim".into(), "eng".into()],
        }
    }
}

/// One complete conversion configuration.
///
/// Serialises to the current wire shape: a flat object tagged by
/// `conversion_mode`, with marker GPU settings under `gpu`. Use
/// [`shape::to_wire`] to produce the legacy shape instead.
///
/// This is a plain value: every reconcile step returns a new one and callers
/// keep the latest. Cloning a preset template yields an independent copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "conversion_mode", rename_all = "lowercase")]
pub enum ConfigModel {
    Marker(MarkerOptions),
    Ocr(OcrOptions),
}

impl Default for ConfigModel {
    fn default() -> Self {
        Self::defaults_for(ConversionMode::Marker)
    }
}

impl ConfigModel {
    /// The default configuration for `mode`.
    pub fn defaults_for(mode: ConversionMode) -> Self {
        match mode {
            ConversionMode::Marker => Self::Marker(MarkerOptions::default()),
            ConversionMode::Ocr => Self::Ocr(OcrOptions::default()),
        }
    }

    pub fn mode(&self) -> ConversionMode {
        match self {
            Self::Marker(_) => ConversionMode::Marker,
            Self::Ocr(_) => ConversionMode::Ocr,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            Self::Marker(m) => m.output_format,
            Self::Ocr(o) => o.output_format,
        }
    }

    pub fn as_marker(&self) -> Option<&MarkerOptions> {
        match self {
            Self::Marker(m) => Some(m),
            Self::Ocr(_) => None,
        }
    }

    pub fn as_ocr(&self) -> Option<&OcrOptions> {
        match self {
            Self::Ocr(o) => Some(o),
            Self::Marker(_) => None,
        }
    }

    /// Apply the normalisation rules and return the result.
    ///
    /// The only rule today is one-directional: `disable_image_extraction`
    /// forces `save_images` off. Turning `save_images` on never touches
    /// `disable_image_extraction`.
    pub fn normalized(mut self) -> Self {
        if let Self::Marker(m) = &mut self {
            if m.disable_image_extraction {
                m.save_images = false;
            }
        }
        self
    }

    /// Check the invariants the client enforces without asking the service.
    ///
    /// Returns every violation found, in field order. An empty vector means
    /// the configuration may be sent.
    pub fn local_violations(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::Marker(m) => {
                if m.save_images && m.disable_image_extraction {
                    errors.push(
                        "save_images and disable_image_extraction cannot both be enabled".into(),
                    );
                }
                if m.gpu.num_devices < 1 {
                    errors.push("gpu.num_devices must be at least 1".into());
                }
                if m.gpu.num_workers < 1 {
                    errors.push("gpu.num_workers must be at least 1".into());
                }
            }
            Self::Ocr(o) => {
                if o.target_languages.is_empty() {
                    errors.push("target_languages must not be empty".into());
                } else if o.target_languages.iter().any(|l| l.trim().is_empty()) {
                    errors.push("target_languages must not contain blank codes".into());
                }
            }
        }
        errors
    }

    /// Normalise, then fail with [`ConfigError::Invalid`] if any local
    /// invariant is still violated.
    pub fn checked(self) -> Result<Self, ConfigError> {
        let config = self.normalized();
        let errors = config.local_violations();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid { errors })
        }
    }
}

/// Force GPU acceleration off when the service has no usable GPU.
///
/// `status` is `None` when the capability query itself failed, which is
/// treated the same as "no GPU". OCR configurations are returned unchanged.
pub fn gate_gpu(config: ConfigModel, status: Option<&GpuStatus>) -> ConfigModel {
    let available = status.map(|s| s.available).unwrap_or(false);
    match config {
        ConfigModel::Marker(mut m) if !available => {
            m.gpu.enabled = false;
            ConfigModel::Marker(m)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marker_defaults_match_latest_iteration() {
        let m = MarkerOptions::default();
        assert!(!m.use_llm);
        assert!(m.strip_existing_ocr);
        assert!(!m.save_images);
        assert!(m.disable_image_extraction);
        assert!(!m.gpu.enabled);
        assert_eq!(m.gpu.num_workers, 4);
        assert_eq!(m.gpu.cuda_visible_devices, "0");
    }

    #[test]
    fn serialises_to_current_shape() {
        let v = serde_json::to_value(ConfigModel::defaults_for(ConversionMode::Ocr)).unwrap();
        assert_eq!(v["conversion_mode"], "ocr");
        assert_eq!(v["ocr_quality"], "balanced");
        assert_eq!(v["target_languages"], json!(["chi_sim", "eng"]));
        assert!(v.get("gpu").is_none());

        let v = serde_json::to_value(ConfigModel::default()).unwrap();
        assert_eq!(v["conversion_mode"], "marker");
        assert_eq!(v["gpu"]["num_devices"], 1);
        assert!(v.get("target_languages").is_none());
    }

    #[test]
    fn deserialise_fills_missing_fields_and_ignores_foreign_ones() {
        let c: ConfigModel = serde_json::from_value(json!({
            "conversion_mode": "marker",
            "use_llm": true,
            "ocr_quality": "fast"
        }))
        .unwrap();
        let m = c.as_marker().unwrap();
        assert!(m.use_llm);
        assert!(m.disable_image_extraction);
    }

    #[test]
    fn disable_image_extraction_forces_save_images_off() {
        let c = ConfigModel::Marker(MarkerOptions {
            save_images: true,
            disable_image_extraction: true,
            ..Default::default()
        })
        .normalized();
        assert!(!c.as_marker().unwrap().save_images);
    }

    #[test]
    fn save_images_does_not_touch_disable_flag() {
        let c = ConfigModel::Marker(MarkerOptions {
            save_images: true,
            disable_image_extraction: false,
            ..Default::default()
        })
        .normalized();
        let m = c.as_marker().unwrap();
        assert!(m.save_images);
        assert!(!m.disable_image_extraction);
    }

    #[test]
    fn checked_reports_gpu_and_language_violations() {
        let mut m = MarkerOptions::default();
        m.gpu.num_devices = 0;
        m.gpu.num_workers = 0;
        let err = ConfigModel::Marker(m).checked().unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                errors: vec![
                    "gpu.num_devices must be at least 1".into(),
                    "gpu.num_workers must be at least 1".into(),
                ]
            }
        );

        let o = OcrOptions {
            target_languages: vec![],
            ..Default::default()
        };
        assert!(ConfigModel::Ocr(o).checked().is_err());
    }

    #[test]
    fn gate_gpu_disables_without_capability() {
        let mut m = MarkerOptions::default();
        m.gpu.enabled = true;
        let gated = gate_gpu(ConfigModel::Marker(m.clone()), None);
        assert!(!gated.as_marker().unwrap().gpu.enabled);

        let status = GpuStatus {
            available: true,
            ..Default::default()
        };
        let kept = gate_gpu(ConfigModel::Marker(m), Some(&status));
        assert!(kept.as_marker().unwrap().gpu.enabled);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("OCR".parse::<ConversionMode>().unwrap(), ConversionMode::Ocr);
        assert!("scan".parse::<ConversionMode>().is_err());
    }
}
