//! Configuration layer: reconciliation properties, wire shapes, presets and
//! the validation endpoints.

mod common;

use common::{Calls, ScriptedService};
use pdf2md_remote::job_config::shape::{from_wire, to_wire};
use pdf2md_remote::job_config::validate::VerdictSource;
use pdf2md_remote::job_config::{gate_gpu, MarkerOptions};
use pdf2md_remote::service::{GpuStatus, PresetEntry};
use pdf2md_remote::{
    ConfigDraft, ConfigError, ConfigModel, ConfigReconciler, ConfigShape, ConfigValidator,
    ConversionMode, FieldEdit, Intent, OcrQuality, PresetCatalog,
};
use serde_json::{json, Value};
use std::sync::Arc;

const MARKER_ONLY: &[&str] = &[
    "use_llm",
    "force_ocr",
    "strip_existing_ocr",
    "save_images",
    "format_lines",
    "disable_image_extraction",
    "gpu",
];
const OCR_ONLY: &[&str] = &[
    "enhance_quality",
    "language_detection",
    "document_type_detection",
    "ocr_quality",
    "target_languages",
];

/// The wire object of `config` carries exactly its own mode's keys.
fn assert_mode_pure(config: &ConfigModel) {
    let wire = to_wire(config, ConfigShape::Current);
    let obj = wire.as_object().unwrap();
    let (own, foreign) = match config.mode() {
        ConversionMode::Marker => (MARKER_ONLY, OCR_ONLY),
        ConversionMode::Ocr => (OCR_ONLY, MARKER_ONLY),
    };
    for key in foreign {
        assert!(!obj.contains_key(*key), "{key} leaked into {wire}");
    }
    for key in own {
        assert!(obj.contains_key(*key), "{key} missing from {wire}");
    }
}

fn catalog() -> PresetCatalog {
    let svc = ScriptedService::new("unused");
    *svc.presets.lock().unwrap() = presets();
    let catalog = PresetCatalog::new();
    tokio_test::block_on(catalog.load(&svc)).unwrap();
    catalog
}

fn presets() -> Vec<PresetEntry> {
    vec![
        PresetEntry {
            name: "High quality".into(),
            description: Some("LLM-assisted marker".into()),
            config: json!({
                "conversion_mode": "marker",
                "use_llm": true,
                "gpu": {"enabled": true, "num_workers": 2}
            }),
        },
        PresetEntry {
            name: "Scanned".into(),
            description: None,
            config: json!({
                "conversion_mode": "ocr",
                "ocr_quality": "accurate",
                "target_languages": ["eng"]
            }),
        },
        PresetEntry {
            name: "Old GPU".into(),
            description: None,
            config: json!({
                "use_llm": false,
                "gpu_config": {"enabled": true, "devices": 2, "workers": 8, "memory_limit": "8GB"}
            }),
        },
        PresetEntry {
            name: "Broken".into(),
            description: None,
            config: json!({"conversion_mode": "telepathy"}),
        },
    ]
}

// ── Reconciliation properties ────────────────────────────────────────────────

#[test]
fn every_intent_sequence_stays_mode_pure() {
    let catalog = catalog();
    let r = ConfigReconciler::new(&catalog);
    let intents = vec![
        Intent::SwitchMode(ConversionMode::Ocr),
        Intent::SetField(FieldEdit::UseLlm(true)),
        Intent::ApplyPreset("Scanned".into()),
        Intent::SetField(FieldEdit::OcrQuality(OcrQuality::Fast)),
        Intent::SwitchMode(ConversionMode::Marker),
        Intent::ApplyPreset("High quality".into()),
        Intent::ApplyCustomEdits(ConfigDraft {
            conversion_mode: Some(ConversionMode::Ocr),
            target_languages: Some(vec!["fra".into()]),
            use_llm: Some(true),
            ..Default::default()
        }),
        Intent::SetField(FieldEdit::GpuNumWorkers(3)),
    ];

    // Every rotation of the sequence, applied from both defaults.
    for start in [ConversionMode::Marker, ConversionMode::Ocr] {
        for offset in 0..intents.len() {
            let mut config = ConfigModel::defaults_for(start);
            for intent in intents.iter().cycle().skip(offset).take(intents.len()) {
                match r.reconcile(&config, intent.clone()) {
                    Ok(next) => config = next,
                    Err(ConfigError::ForeignField { .. }) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
                assert_mode_pure(&config);
                assert!(config.local_violations().is_empty());
            }
        }
    }
}

#[test]
fn switching_mode_discards_everything_else() {
    let catalog = catalog();
    let r = ConfigReconciler::new(&catalog);
    let ocr = r
        .reconcile(
            &ConfigModel::defaults_for(ConversionMode::Ocr),
            Intent::SetField(FieldEdit::OcrQuality(OcrQuality::Accurate)),
        )
        .unwrap();
    let marker = r
        .reconcile(&ocr, Intent::SwitchMode(ConversionMode::Marker))
        .unwrap();
    assert_eq!(marker, ConfigModel::Marker(MarkerOptions::default()));

    let back = r
        .reconcile(&marker, Intent::SwitchMode(ConversionMode::Ocr))
        .unwrap();
    assert_eq!(back, ConfigModel::defaults_for(ConversionMode::Ocr));
}

#[test]
fn foreign_field_edit_is_refused() {
    let catalog = catalog();
    let r = ConfigReconciler::new(&catalog);
    let err = r
        .reconcile(
            &ConfigModel::default(),
            Intent::SetField(FieldEdit::TargetLanguages(vec!["eng".into()])),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::ForeignField { .. }));
}

#[test]
fn disabling_extraction_turns_off_saving() {
    let catalog = catalog();
    let r = ConfigReconciler::new(&catalog);
    let mut config = ConfigModel::default();
    for edit in ["disable_image_extraction=false", "save_images=true"] {
        config = r
            .reconcile(&config, Intent::SetField(edit.parse().unwrap()))
            .unwrap();
    }
    assert!(config.as_marker().unwrap().save_images);

    let config = r
        .reconcile(
            &config,
            Intent::SetField(FieldEdit::DisableImageExtraction(true)),
        )
        .unwrap();
    let m = config.as_marker().unwrap();
    assert!(m.disable_image_extraction);
    assert!(!m.save_images);
}

// ── Presets ──────────────────────────────────────────────────────────────────

#[test]
fn preset_copies_are_independent() {
    let catalog = catalog();
    let r = ConfigReconciler::new(&catalog);

    let a = r
        .reconcile(&ConfigModel::default(), Intent::ApplyPreset("High quality".into()))
        .unwrap();
    let edited = r
        .reconcile(&a, Intent::SetField(FieldEdit::UseLlm(false)))
        .unwrap();
    let b = r
        .reconcile(&ConfigModel::default(), Intent::ApplyPreset("High quality".into()))
        .unwrap();

    assert!(!edited.as_marker().unwrap().use_llm);
    assert!(b.as_marker().unwrap().use_llm);
    assert_eq!(a, b);
    assert_eq!(catalog.get("High quality").unwrap(), b);
}

#[test]
fn catalog_skips_unparseable_presets_and_upgrades_legacy_ones() {
    let catalog = catalog();
    assert_eq!(catalog.names(), vec!["High quality", "Scanned", "Old GPU"]);

    let old = catalog.get("Old GPU").unwrap();
    let m = old.as_marker().unwrap();
    assert!(m.gpu.enabled);
    assert_eq!(m.gpu.num_devices, 2);
    assert_eq!(m.gpu.num_workers, 8);

    assert!(matches!(
        catalog.get("Broken"),
        Err(ConfigError::PresetNotFound { .. })
    ));
}

#[test]
fn unloaded_catalog_has_no_presets() {
    let catalog = PresetCatalog::new();
    let r = ConfigReconciler::new(&catalog);
    let err = r
        .reconcile(&ConfigModel::default(), Intent::ApplyPreset("Scanned".into()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::CatalogNotLoaded));
}

#[tokio::test]
async fn catalog_fetches_once() {
    let svc = ScriptedService::new("unused");
    *svc.presets.lock().unwrap() = presets();
    let catalog = PresetCatalog::new();
    assert!(!catalog.is_loaded());

    catalog.load(&svc).await.unwrap();
    let again = catalog.load(&svc).await.unwrap();
    assert_eq!(again.len(), 3);
    assert!(catalog.is_loaded());
    assert_eq!(Calls::get(&svc.calls.presets), 1);
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[test]
fn legacy_object_reads_as_current_model() {
    let legacy = json!({
        "conversion_mode": "marker",
        "use_llm": true,
        "gpu_config": {"enabled": true, "devices": 2, "workers": 6, "memory_limit": "16GB"}
    });
    let (model, shape) = from_wire(&legacy).unwrap();
    assert_eq!(shape, ConfigShape::Legacy);
    let m = model.as_marker().unwrap();
    assert!(m.use_llm);
    assert_eq!(m.gpu.num_devices, 2);
    assert_eq!(m.gpu.num_workers, 6);

    let back = to_wire(&model, ConfigShape::Legacy);
    assert!(back.get("gpu").is_none());
    assert_eq!(back["gpu_config"]["num_devices"], 2);
    assert!(back["gpu_config"].get("memory_limit").is_none());
}

#[test]
fn draft_file_accepts_either_shape() {
    let legacy: ConfigDraft = serde_json::from_value(json!({
        "gpu_config": {"enabled": true, "workers": 2, "memory_limit": "4GB"}
    }))
    .unwrap();
    let current: ConfigDraft = serde_json::from_value(json!({
        "gpu": {"enabled": true, "num_workers": 2}
    }))
    .unwrap();
    assert_eq!(legacy, current);

    let catalog = catalog();
    let r = ConfigReconciler::new(&catalog);
    let config = r
        .reconcile(&ConfigModel::default(), Intent::ApplyCustomEdits(legacy))
        .unwrap();
    assert!(config.as_marker().unwrap().gpu.enabled);
    assert_eq!(config.as_marker().unwrap().gpu.num_workers, 2);
}

#[test]
fn gpu_is_gated_on_service_capability() {
    let mut config = ConfigModel::default();
    FieldEdit::GpuEnabled(true).apply_to(&mut config).unwrap();

    let no_gpu = GpuStatus::default();
    assert!(!gate_gpu(config.clone(), Some(&no_gpu)).as_marker().unwrap().gpu.enabled);
    assert!(!gate_gpu(config.clone(), None).as_marker().unwrap().gpu.enabled);

    let gpu = GpuStatus {
        available: true,
        device_count: 1,
        ..Default::default()
    };
    assert!(gate_gpu(config, Some(&gpu)).as_marker().unwrap().gpu.enabled);
}

// ── Validation endpoints ─────────────────────────────────────────────────────

#[tokio::test]
async fn local_violation_skips_the_service() {
    let svc = Arc::new(ScriptedService::new("unused"));
    let validator = ConfigValidator::new(svc.clone(), ConfigShape::Current);
    let mut config = ConfigModel::default();
    if let ConfigModel::Marker(m) = &mut config {
        m.gpu.num_devices = 0;
    }

    let verdict = validator.validate(&config).await.unwrap();
    assert!(!verdict.is_valid());
    assert_eq!(verdict.source, VerdictSource::Local);
    assert_eq!(Calls::get(&svc.calls.validate), 0);
}

#[tokio::test]
async fn remote_verdict_is_returned_verbatim() {
    let svc = Arc::new(ScriptedService::new("unused"));
    {
        let mut report = svc.validation.lock().unwrap();
        report.valid = false;
        report.errors = vec!["torch_device 'tpu' is not supported".into()];
        report.warnings = vec!["num_workers is high".into()];
    }
    let validator = ConfigValidator::new(svc.clone(), ConfigShape::Current);

    let verdict = validator.validate(&ConfigModel::default()).await.unwrap();
    assert_eq!(verdict.source, VerdictSource::Remote);
    assert_eq!(verdict.report.errors, vec!["torch_device 'tpu' is not supported"]);
    assert_eq!(verdict.report.warnings, vec!["num_workers is high"]);
    assert_eq!(
        verdict.into_result(),
        Err(ConfigError::Invalid {
            errors: vec!["torch_device 'tpu' is not supported".into()]
        })
    );
    assert_eq!(Calls::get(&svc.calls.validate), 1);
}

#[tokio::test]
async fn auto_fix_parses_the_repaired_config() {
    let svc = Arc::new(ScriptedService::new("unused"));
    let validator = ConfigValidator::new(svc, ConfigShape::Current);
    let mixed: Value = json!({
        "conversion_mode": "marker",
        "use_llm": true,
        "ocr_quality": "fast",
        "target_languages": ["eng"]
    });

    let outcome = validator.auto_fix(&mixed).await.unwrap();
    assert_eq!(outcome.config.mode(), ConversionMode::Marker);
    assert!(outcome.config.as_marker().unwrap().use_llm);
    assert_eq!(outcome.report.issues.len(), 1);
}
