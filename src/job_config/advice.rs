//! Human-readable descriptions of a configuration.

use super::shape::ConfigShape;
use super::ConfigModel;

/// One-line summary, e.g. `MARKER mode, markdown output (GPU: off, LLM: on)`.
pub fn summary(config: &ConfigModel) -> String {
    let on_off = |b: bool| if b { "on" } else { "off" };
    match config {
        ConfigModel::Marker(m) => format!(
            "MARKER mode, markdown output (GPU: {}, LLM: {})",
            on_off(m.gpu.enabled),
            on_off(m.use_llm)
        ),
        ConfigModel::Ocr(o) => format!(
            "OCR mode, markdown output (quality: {}, languages: {})",
            o.ocr_quality,
            o.target_languages.join("+")
        ),
    }
}

/// Tuning hints for `config`. `shape` is the shape it was read from, if any.
pub fn suggestions(config: &ConfigModel, shape: ConfigShape) -> Vec<String> {
    let mut hints = Vec::new();
    if shape == ConfigShape::Legacy {
        hints.push("Legacy configuration (gpu_config); consider saving it in the current shape".into());
    }
    match config {
        ConfigModel::Marker(m) => {
            if m.gpu.enabled {
                hints.push("GPU enabled: make sure the service has CUDA available".into());
            }
            if m.use_llm {
                hints.push("LLM enabled: conversion will be slower but more accurate".into());
            }
            if !m.disable_image_extraction {
                hints.push("Image extraction enabled: may slow conversion down".into());
            }
        }
        ConfigModel::Ocr(o) => {
            use super::OcrQuality;
            match o.ocr_quality {
                OcrQuality::Accurate => {
                    hints.push("Accurate OCR: slower, but higher recognition accuracy".into())
                }
                OcrQuality::Fast => {
                    hints.push("Fast OCR: quick, but recognition accuracy may drop".into())
                }
                OcrQuality::Balanced => {}
            }
            if o.target_languages.len() > 2 {
                hints.push("Many target languages: recognition may be slower".into());
            }
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_config::{ConversionMode, OcrOptions};

    #[test]
    fn summary_describes_mode() {
        assert_eq!(
            summary(&ConfigModel::default()),
            "MARKER mode, markdown output (GPU: off, LLM: off)"
        );
        assert_eq!(
            summary(&ConfigModel::defaults_for(ConversionMode::Ocr)),
            "OCR mode, markdown output (quality: balanced, languages: chi_sim+eng)"
        );
    }

    #[test]
    fn defaults_need_no_advice() {
        assert!(suggestions(&ConfigModel::default(), ConfigShape::Current).is_empty());
    }

    #[test]
    fn legacy_and_language_hints() {
        let ocr = ConfigModel::Ocr(OcrOptions {
            target_languages: vec!["eng".into(), "fra".into(), "deu".into()],
            ..Default::default()
        });
        let hints = suggestions(&ocr, ConfigShape::Legacy);
        assert_eq!(hints.len(), 2);
        assert!(hints[0].starts_with("Legacy"));
        assert!(hints[1].contains("languages"));
    }
}
