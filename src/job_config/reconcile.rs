//! Turning a user intent into the next valid configuration.
//!
//! [`ConfigReconciler::reconcile`] is pure: it takes the previous value by
//! reference and returns a new one. No network call happens here; remote
//! validation is a separate, caller-initiated step (see [`super::validate`]).
//!
//! | Intent             | Effect                                                  |
//! |--------------------|---------------------------------------------------------|
//! | `SwitchMode`       | mode defaults; foreign fields discarded                 |
//! | `SetField`         | one field edited; foreign field → `ForeignField`        |
//! | `ApplyPreset`      | a clone of the template, checked                        |
//! | `ApplyCustomEdits` | draft merged over previous (draft wins), checked        |
//!
//! Every path ends with normalisation and the local invariant check.

use super::edit::{ConfigDraft, FieldEdit};
use super::preset::PresetCatalog;
use super::{ConfigModel, ConversionMode};
use crate::error::ConfigError;
use tracing::debug;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SwitchMode(ConversionMode),
    SetField(FieldEdit),
    ApplyPreset(String),
    ApplyCustomEdits(ConfigDraft),
}

/// Applies [`Intent`]s against a preset catalog.
#[derive(Debug, Clone, Copy)]
pub struct ConfigReconciler<'a> {
    catalog: &'a PresetCatalog,
}

impl<'a> ConfigReconciler<'a> {
    pub fn new(catalog: &'a PresetCatalog) -> Self {
        Self { catalog }
    }

    /// Produce the configuration that follows `previous` under `intent`.
    pub fn reconcile(
        &self,
        previous: &ConfigModel,
        intent: Intent,
    ) -> Result<ConfigModel, ConfigError> {
        let next = match intent {
            Intent::SwitchMode(mode) => switch_mode(previous, mode),
            Intent::SetField(edit) => {
                let mut next = previous.clone();
                edit.apply_to(&mut next)?;
                next
            }
            Intent::ApplyPreset(name) => {
                let template = self.catalog.get(&name)?;
                debug!("Applying preset '{name}' ({} mode)", template.mode());
                template
            }
            Intent::ApplyCustomEdits(draft) => {
                let mode = draft.conversion_mode.unwrap_or_else(|| previous.mode());
                let mut next = switch_mode(previous, mode);
                draft.merge_into(&mut next);
                next
            }
        };
        next.checked()
    }
}

/// Keep `previous` if it is already in `mode`, otherwise start over from the
/// mode's defaults. Nothing carries across modes.
fn switch_mode(previous: &ConfigModel, mode: ConversionMode) -> ConfigModel {
    if previous.mode() == mode {
        previous.clone()
    } else {
        ConfigModel::defaults_for(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_config::preset::Preset;
    use crate::job_config::{MarkerOptions, OcrQuality};

    fn empty() -> PresetCatalog {
        PresetCatalog::from_presets(vec![])
    }

    #[test]
    fn switch_to_same_mode_keeps_edits() {
        let catalog = empty();
        let r = ConfigReconciler::new(&catalog);
        let c = r
            .reconcile(
                &ConfigModel::default(),
                Intent::SetField(FieldEdit::UseLlm(true)),
            )
            .unwrap();
        let same = r
            .reconcile(&c, Intent::SwitchMode(ConversionMode::Marker))
            .unwrap();
        assert_eq!(same, c);
    }

    #[test]
    fn set_field_normalises() {
        let catalog = empty();
        let r = ConfigReconciler::new(&catalog);
        let mut c = r
            .reconcile(
                &ConfigModel::default(),
                Intent::SetField(FieldEdit::DisableImageExtraction(false)),
            )
            .unwrap();
        c = r
            .reconcile(&c, Intent::SetField(FieldEdit::SaveImages(true)))
            .unwrap();
        assert!(c.as_marker().unwrap().save_images);

        c = r
            .reconcile(&c, Intent::SetField(FieldEdit::DisableImageExtraction(true)))
            .unwrap();
        let m = c.as_marker().unwrap();
        assert!(!m.save_images);
        assert!(m.disable_image_extraction);
    }

    #[test]
    fn set_field_refuses_foreign_field() {
        let catalog = empty();
        let r = ConfigReconciler::new(&catalog);
        let err = r
            .reconcile(
                &ConfigModel::default(),
                Intent::SetField(FieldEdit::OcrQuality(OcrQuality::Fast)),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::ForeignField { .. }));
    }

    #[test]
    fn set_field_rejects_empty_languages() {
        let catalog = empty();
        let r = ConfigReconciler::new(&catalog);
        let ocr = ConfigModel::defaults_for(ConversionMode::Ocr);
        let err = r
            .reconcile(&ocr, Intent::SetField(FieldEdit::TargetLanguages(vec![])))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn preset_failing_local_check_is_surfaced() {
        let mut bad = MarkerOptions::default();
        bad.gpu.num_workers = 0;
        let catalog = PresetCatalog::from_presets(vec![Preset {
            name: "broken".into(),
            description: None,
            config: ConfigModel::Marker(bad),
        }]);
        let r = ConfigReconciler::new(&catalog);
        let err = r
            .reconcile(&ConfigModel::default(), Intent::ApplyPreset("broken".into()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                errors: vec!["gpu.num_workers must be at least 1".into()]
            }
        );
    }

    #[test]
    fn preset_switches_mode() {
        let catalog = PresetCatalog::from_presets(vec![Preset {
            name: "scan".into(),
            description: None,
            config: ConfigModel::defaults_for(ConversionMode::Ocr),
        }]);
        let r = ConfigReconciler::new(&catalog);
        let c = r
            .reconcile(&ConfigModel::default(), Intent::ApplyPreset("scan".into()))
            .unwrap();
        assert_eq!(c.mode(), ConversionMode::Ocr);
    }

    #[test]
    fn custom_edits_win_over_previous() {
        let catalog = empty();
        let r = ConfigReconciler::new(&catalog);
        let previous = r
            .reconcile(
                &ConfigModel::default(),
                Intent::SetField(FieldEdit::FormatLines(true)),
            )
            .unwrap();
        let draft = ConfigDraft {
            use_llm: Some(true),
            format_lines: Some(false),
            ..Default::default()
        };
        let c = r
            .reconcile(&previous, Intent::ApplyCustomEdits(draft))
            .unwrap();
        let m = c.as_marker().unwrap();
        assert!(m.use_llm);
        assert!(!m.format_lines);
    }

    #[test]
    fn custom_edits_can_switch_mode() {
        let catalog = empty();
        let r = ConfigReconciler::new(&catalog);
        let draft = ConfigDraft {
            conversion_mode: Some(ConversionMode::Ocr),
            ocr_quality: Some(OcrQuality::Accurate),
            use_llm: Some(true),
            ..Default::default()
        };
        let c = r
            .reconcile(&ConfigModel::default(), Intent::ApplyCustomEdits(draft))
            .unwrap();
        assert_eq!(c.as_ocr().unwrap().ocr_quality, OcrQuality::Accurate);
    }
}
