//! Typed field edits and partial configuration drafts.
//!
//! A [`FieldEdit`] changes exactly one field and knows which mode it belongs
//! to, so applying it to a configuration of the other mode fails with
//! [`ConfigError::ForeignField`] instead of silently growing a foreign key.
//!
//! A [`ConfigDraft`] is the bulk form: every field optional, deserialisable
//! from either wire shape. It is what a "custom settings" dialog hands back.

use super::{ConfigModel, ConversionMode, OcrQuality, OutputFormat};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// A single-field change to a [`ConfigModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    OutputFormat(OutputFormat),
    // ── marker ──
    UseLlm(bool),
    ForceOcr(bool),
    StripExistingOcr(bool),
    SaveImages(bool),
    FormatLines(bool),
    DisableImageExtraction(bool),
    GpuEnabled(bool),
    GpuNumDevices(u32),
    GpuNumWorkers(u32),
    GpuTorchDevice(String),
    GpuCudaVisibleDevices(String),
    // ── ocr ──
    EnhanceQuality(bool),
    LanguageDetection(bool),
    DocumentTypeDetection(bool),
    OcrQuality(OcrQuality),
    TargetLanguages(Vec<String>),
}

impl FieldEdit {
    /// Canonical (current-shape) path of the edited field.
    pub fn path(&self) -> &'static str {
        match self {
            Self::OutputFormat(_) => "output_format",
            Self::UseLlm(_) => "use_llm",
            Self::ForceOcr(_) => "force_ocr",
            Self::StripExistingOcr(_) => "strip_existing_ocr",
            Self::SaveImages(_) => "save_images",
            Self::FormatLines(_) => "format_lines",
            Self::DisableImageExtraction(_) => "disable_image_extraction",
            Self::GpuEnabled(_) => "gpu.enabled",
            Self::GpuNumDevices(_) => "gpu.num_devices",
            Self::GpuNumWorkers(_) => "gpu.num_workers",
            Self::GpuTorchDevice(_) => "gpu.torch_device",
            Self::GpuCudaVisibleDevices(_) => "gpu.cuda_visible_devices",
            Self::EnhanceQuality(_) => "enhance_quality",
            Self::LanguageDetection(_) => "language_detection",
            Self::DocumentTypeDetection(_) => "document_type_detection",
            Self::OcrQuality(_) => "ocr_quality",
            Self::TargetLanguages(_) => "target_languages",
        }
    }

    /// The mode this field belongs to, or `None` for shared fields.
    pub fn mode(&self) -> Option<ConversionMode> {
        match self {
            Self::OutputFormat(_) => None,
            Self::UseLlm(_)
            | Self::ForceOcr(_)
            | Self::StripExistingOcr(_)
            | Self::SaveImages(_)
            | Self::FormatLines(_)
            | Self::DisableImageExtraction(_)
            | Self::GpuEnabled(_)
            | Self::GpuNumDevices(_)
            | Self::GpuNumWorkers(_)
            | Self::GpuTorchDevice(_)
            | Self::GpuCudaVisibleDevices(_) => Some(ConversionMode::Marker),
            Self::EnhanceQuality(_)
            | Self::LanguageDetection(_)
            | Self::DocumentTypeDetection(_)
            | Self::OcrQuality(_)
            | Self::TargetLanguages(_) => Some(ConversionMode::Ocr),
        }
    }

    /// Build an edit from a field path and its textual value.
    ///
    /// Accepts current paths (`gpu.num_devices`) and legacy ones
    /// (`gpu_config.devices`).
    pub fn parse(path: &str, value: &str) -> Result<Self, ConfigError> {
        let path = path.trim();
        let value = value.trim();
        let key = path
            .strip_prefix("gpu_config.")
            .map(|rest| format!("gpu.{rest}"))
            .unwrap_or_else(|| path.to_string());

        let edit = match key.as_str() {
            "output_format" => Self::OutputFormat(value.parse()?),
            "use_llm" => Self::UseLlm(parse_bool(path, value)?),
            "force_ocr" => Self::ForceOcr(parse_bool(path, value)?),
            "strip_existing_ocr" => Self::StripExistingOcr(parse_bool(path, value)?),
            "save_images" => Self::SaveImages(parse_bool(path, value)?),
            "format_lines" => Self::FormatLines(parse_bool(path, value)?),
            "disable_image_extraction" => Self::DisableImageExtraction(parse_bool(path, value)?),
            "gpu.enabled" => Self::GpuEnabled(parse_bool(path, value)?),
            "gpu.num_devices" | "gpu.devices" => Self::GpuNumDevices(parse_count(path, value)?),
            "gpu.num_workers" | "gpu.workers" => Self::GpuNumWorkers(parse_count(path, value)?),
            "gpu.torch_device" => Self::GpuTorchDevice(value.to_string()),
            "gpu.cuda_visible_devices" => Self::GpuCudaVisibleDevices(value.to_string()),
            "enhance_quality" => Self::EnhanceQuality(parse_bool(path, value)?),
            "language_detection" => Self::LanguageDetection(parse_bool(path, value)?),
            "document_type_detection" => Self::DocumentTypeDetection(parse_bool(path, value)?),
            "ocr_quality" => Self::OcrQuality(value.parse()?),
            "target_languages" => Self::TargetLanguages(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => {
                return Err(ConfigError::UnknownField {
                    path: path.to_string(),
                })
            }
        };
        Ok(edit)
    }

    /// Apply this edit in place.
    ///
    /// Fails with [`ConfigError::ForeignField`] when the field belongs to the
    /// other mode. Does not normalise; the reconciler does that afterwards.
    pub fn apply_to(&self, config: &mut ConfigModel) -> Result<(), ConfigError> {
        let active = config.mode();
        if self.write(config) {
            Ok(())
        } else {
            Err(ConfigError::ForeignField {
                field: self.path().to_string(),
                mode: active.to_string(),
            })
        }
    }

    /// Store the value if the field belongs to `config`'s mode; `false` if
    /// it does not, in which case `config` is untouched.
    fn write(&self, config: &mut ConfigModel) -> bool {
        match (config, self) {
            (ConfigModel::Marker(m), Self::OutputFormat(v)) => m.output_format = *v,
            (ConfigModel::Ocr(o), Self::OutputFormat(v)) => o.output_format = *v,
            (ConfigModel::Marker(m), edit) => match edit {
                Self::UseLlm(v) => m.use_llm = *v,
                Self::ForceOcr(v) => m.force_ocr = *v,
                Self::StripExistingOcr(v) => m.strip_existing_ocr = *v,
                Self::SaveImages(v) => m.save_images = *v,
                Self::FormatLines(v) => m.format_lines = *v,
                Self::DisableImageExtraction(v) => m.disable_image_extraction = *v,
                Self::GpuEnabled(v) => m.gpu.enabled = *v,
                Self::GpuNumDevices(v) => m.gpu.num_devices = *v,
                Self::GpuNumWorkers(v) => m.gpu.num_workers = *v,
                Self::GpuTorchDevice(v) => m.gpu.torch_device = v.clone(),
                Self::GpuCudaVisibleDevices(v) => m.gpu.cuda_visible_devices = v.clone(),
                _ => return false,
            },
            (ConfigModel::Ocr(o), edit) => match edit {
                Self::EnhanceQuality(v) => o.enhance_quality = *v,
                Self::LanguageDetection(v) => o.language_detection = *v,
                Self::DocumentTypeDetection(v) => o.document_type_detection = *v,
                Self::OcrQuality(v) => o.ocr_quality = *v,
                Self::TargetLanguages(v) => o.target_languages = v.clone(),
                _ => return false,
            },
        }
        true
    }
}

impl FromStr for FieldEdit {
    type Err = ConfigError;

    /// Parse `path=value`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, value) = s.split_once('=').ok_or_else(|| ConfigError::BadValue {
            path: s.to_string(),
            value: String::new(),
            reason: "expected 'path=value'".into(),
        })?;
        Self::parse(path, value)
    }
}

fn parse_bool(path: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::BadValue {
            path: path.to_string(),
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

fn parse_count(path: &str, value: &str) -> Result<u32, ConfigError> {
    match value.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ConfigError::BadValue {
            path: path.to_string(),
            value: value.to_string(),
            reason: "expected an integer of at least 1".into(),
        }),
    }
}

/// Partial GPU record inside a [`ConfigDraft`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(alias = "devices", skip_serializing_if = "Option::is_none")]
    pub num_devices: Option<u32>,
    #[serde(alias = "workers", skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torch_device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda_visible_devices: Option<String>,
}

/// A partial configuration: only the fields that are `Some` are applied.
///
/// Reads either shape: `gpu_config` is accepted for `gpu`, and the legacy
/// `devices`/`workers` names inside it are accepted too. Unknown keys such as
/// the legacy `memory_limit` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_mode: Option<ConversionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_llm: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_ocr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_existing_ocr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_lines: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_image_extraction: Option<bool>,
    #[serde(alias = "gpu_config", skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhance_quality: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type_detection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_quality: Option<OcrQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_languages: Option<Vec<String>>,
}

impl ConfigDraft {
    /// A draft with every field of `config` filled in.
    pub fn from_config(config: &ConfigModel) -> Self {
        let mut draft = Self {
            conversion_mode: Some(config.mode()),
            output_format: Some(config.output_format()),
            ..Default::default()
        };
        match config {
            ConfigModel::Marker(m) => {
                draft.use_llm = Some(m.use_llm);
                draft.force_ocr = Some(m.force_ocr);
                draft.strip_existing_ocr = Some(m.strip_existing_ocr);
                draft.save_images = Some(m.save_images);
                draft.format_lines = Some(m.format_lines);
                draft.disable_image_extraction = Some(m.disable_image_extraction);
                draft.gpu = Some(GpuDraft {
                    enabled: Some(m.gpu.enabled),
                    num_devices: Some(m.gpu.num_devices),
                    num_workers: Some(m.gpu.num_workers),
                    torch_device: Some(m.gpu.torch_device.clone()),
                    cuda_visible_devices: Some(m.gpu.cuda_visible_devices.clone()),
                });
            }
            ConfigModel::Ocr(o) => {
                draft.enhance_quality = Some(o.enhance_quality);
                draft.language_detection = Some(o.language_detection);
                draft.document_type_detection = Some(o.document_type_detection);
                draft.ocr_quality = Some(o.ocr_quality);
                draft.target_languages = Some(o.target_languages.clone());
            }
        }
        draft
    }

    /// Expand the set fields into single-field edits, in field order.
    pub fn edits(&self) -> Vec<FieldEdit> {
        let mut edits = Vec::new();
        if let Some(v) = self.output_format {
            edits.push(FieldEdit::OutputFormat(v));
        }
        let flags = [
            (self.use_llm, FieldEdit::UseLlm as fn(bool) -> FieldEdit),
            (self.force_ocr, FieldEdit::ForceOcr),
            (self.strip_existing_ocr, FieldEdit::StripExistingOcr),
            (self.save_images, FieldEdit::SaveImages),
            (self.format_lines, FieldEdit::FormatLines),
            (self.disable_image_extraction, FieldEdit::DisableImageExtraction),
        ];
        edits.extend(flags.into_iter().filter_map(|(v, f)| v.map(f)));
        if let Some(gpu) = &self.gpu {
            if let Some(v) = gpu.enabled {
                edits.push(FieldEdit::GpuEnabled(v));
            }
            if let Some(v) = gpu.num_devices {
                edits.push(FieldEdit::GpuNumDevices(v));
            }
            if let Some(v) = gpu.num_workers {
                edits.push(FieldEdit::GpuNumWorkers(v));
            }
            if let Some(v) = &gpu.torch_device {
                edits.push(FieldEdit::GpuTorchDevice(v.clone()));
            }
            if let Some(v) = &gpu.cuda_visible_devices {
                edits.push(FieldEdit::GpuCudaVisibleDevices(v.clone()));
            }
        }
        let ocr_flags = [
            (self.enhance_quality, FieldEdit::EnhanceQuality as fn(bool) -> FieldEdit),
            (self.language_detection, FieldEdit::LanguageDetection),
            (self.document_type_detection, FieldEdit::DocumentTypeDetection),
        ];
        edits.extend(ocr_flags.into_iter().filter_map(|(v, f)| v.map(f)));
        if let Some(v) = self.ocr_quality {
            edits.push(FieldEdit::OcrQuality(v));
        }
        if let Some(v) = &self.target_languages {
            edits.push(FieldEdit::TargetLanguages(v.clone()));
        }
        edits
    }

    /// Apply every set field that belongs to `config`'s mode.
    ///
    /// Fields of the other mode are skipped, not rejected: a draft may be a
    /// full dump of a form that shows both modes.
    pub fn merge_into(&self, config: &mut ConfigModel) {
        for edit in self.edits() {
            if !edit.write(config) {
                debug!("Ignoring foreign draft field {}", edit.path());
            }
        }
    }
}
