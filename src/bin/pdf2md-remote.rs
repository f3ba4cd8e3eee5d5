//! CLI binary for pdf2md-remote.
//!
//! A thin shim over the library crate: maps CLI flags to a `ClientConfig`
//! and a `ConfigModel`, drives one `TaskOrchestrator`, and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2md_remote::job_config::{advice, gate_gpu};
use pdf2md_remote::{
    format_elapsed, ClientConfig, ConfigDraft, ConfigModel, ConfigReconciler, ConfigShape,
    ConfigValidator, ConversionMode, ConversionResult, ConversionService, FieldEdit,
    HttpConversionService, Intent, Phase, PresetCatalog, SharedObserver, TaskObserver,
    TaskOrchestrator,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner while uploading, then a percentage bar fed by
/// the service's progress reports.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl TaskObserver for CliObserver {
    fn on_phase_change(&self, _from: Phase, to: Phase) {
        match to {
            Phase::Uploading => self.bar.set_prefix("Uploading"),
            Phase::Converting => self.bar.set_prefix("Submitting"),
            Phase::Polling => self.bar.set_prefix("Converting"),
            Phase::Completed => {
                self.bar.set_position(100);
                self.bar.set_prefix("Fetching");
            }
            Phase::Failed | Phase::Idle => self.bar.finish_and_clear(),
            _ => {}
        }
    }

    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_tick(&self, elapsed: Duration) {
        self.bar.set_message(format_elapsed(elapsed));
    }

    fn on_notice(&self, message: &str) {
        self.bar.println(format!("  {} {}", red("✗"), red(message)));
    }

    fn on_result(&self, result: &ConversionResult) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} chars, {} images",
            green("✔"),
            bold(&result.content.len().to_string()),
            result.image_count
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Text PDF, Markdown to stdout
  pdf2md-remote --mode marker report.pdf

  # Scanned PDF, accurate OCR, English and French
  pdf2md-remote --mode ocr --set ocr_quality=accurate --set target_languages=eng,fra scan.pdf -o scan.md

  # Apply a server preset, then tweak one field
  pdf2md-remote --preset "High quality" --set use_llm=true paper.pdf -o paper.md

  # Keep extracted images
  pdf2md-remote --mode marker --set disable_image_extraction=false --set save_images=true \
      slides.pdf -o slides.md --images ./slides-images

  # Bulk edits from a file (either config shape is accepted)
  pdf2md-remote --config settings.json book.pdf -o book.md

  # Older servers that only understand `gpu_config`
  pdf2md-remote --legacy-wire --mode marker doc.pdf

  # Inspect the server
  pdf2md-remote --list-presets
  pdf2md-remote --gpu-status
  pdf2md-remote --mode marker --set gpu.enabled=true --check-config

FIELDS FOR --set:
  both     output_format
  marker   use_llm force_ocr strip_existing_ocr save_images format_lines
           disable_image_extraction gpu.enabled gpu.num_devices gpu.num_workers
           gpu.torch_device gpu.cuda_visible_devices
  ocr      enhance_quality language_detection document_type_detection
           ocr_quality (fast|balanced|accurate) target_languages (comma-separated)

ENVIRONMENT VARIABLES:
  PDF2MD_REMOTE_SERVER     Service base URL (default http://127.0.0.1:8001)
  PDF2MD_REMOTE_MODE       Conversion mode
  PDF2MD_REMOTE_PRESET     Preset name
  RUST_LOG                 Log filter override
"#;

/// Convert PDF files to Markdown through a remote conversion service.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-remote",
    version,
    about = "Convert PDF files to Markdown through a remote conversion service",
    long_about = "Upload a PDF to a running conversion service, configure the job (marker mode for \
text PDFs, OCR mode for scans), follow its progress and write the resulting Markdown.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file.
    #[arg(required_unless_present_any = ["list_presets", "gpu_status", "check_config"])]
    input: Option<PathBuf>,

    /// Service base URL.
    #[arg(long, env = "PDF2MD_REMOTE_SERVER", default_value = "http://127.0.0.1:8001")]
    server: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "PDF2MD_REMOTE_OUTPUT")]
    output: Option<PathBuf>,

    /// Download the extracted images (zip) into this directory.
    #[arg(long, env = "PDF2MD_REMOTE_IMAGES")]
    images: Option<PathBuf>,

    /// Conversion mode: marker (text PDFs) or ocr (scanned PDFs).
    #[arg(short, long, env = "PDF2MD_REMOTE_MODE", value_enum)]
    mode: Option<ModeArg>,

    /// Start from a server preset.
    #[arg(short, long, env = "PDF2MD_REMOTE_PRESET")]
    preset: Option<String>,

    /// Set one field: path=value. Repeatable.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    set: Vec<FieldEdit>,

    /// JSON file with a (partial) configuration to merge in.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Send the legacy configuration shape (`gpu_config`).
    #[arg(long, env = "PDF2MD_REMOTE_LEGACY_WIRE")]
    legacy_wire: bool,

    /// Ask the service to validate the configuration before converting.
    #[arg(long, env = "PDF2MD_REMOTE_VALIDATE")]
    validate: bool,

    /// Largest file to upload, in MiB.
    #[arg(long, env = "PDF2MD_REMOTE_MAX_SIZE_MB", default_value_t = 100)]
    max_size_mb: u64,

    /// Progress poll interval in milliseconds.
    #[arg(long, env = "PDF2MD_REMOTE_POLL_MS", default_value_t = 1000)]
    poll_ms: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "PDF2MD_REMOTE_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// List the server's presets and exit.
    #[arg(long)]
    list_presets: bool,

    /// Show the server's GPU status and exit.
    #[arg(long)]
    gpu_status: bool,

    /// Validate the configuration (locally and remotely) and exit.
    #[arg(long)]
    check_config: bool,

    /// Print the final task snapshot as JSON instead of Markdown.
    #[arg(long, env = "PDF2MD_REMOTE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2MD_REMOTE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_REMOTE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_REMOTE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Marker,
    Ocr,
}

impl From<ModeArg> for ConversionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Marker => ConversionMode::Marker,
            ModeArg::Ocr => ConversionMode::Ocr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let info_mode = cli.list_presets || cli.gpu_status || cli.check_config;
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !info_mode;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let client_config = build_client_config(&cli)?;
    let service: Arc<dyn ConversionService> = Arc::new(
        HttpConversionService::new(&client_config).context("Failed to create HTTP client")?,
    );

    // ── Info modes ───────────────────────────────────────────────────────
    if cli.list_presets {
        return list_presets(&cli, service.as_ref()).await;
    }
    if cli.gpu_status {
        return print_gpu_status(&cli, service.as_ref()).await;
    }

    let job = build_job_config(&cli, service.as_ref()).await?;

    if cli.check_config {
        return check_config(&cli, &client_config, service, job).await;
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let input = cli
        .input
        .as_ref()
        .context("No input file given")?;

    let observer: SharedObserver = if show_progress {
        CliObserver::new()
    } else {
        Arc::new(pdf2md_remote::NoopObserver)
    };
    let task = TaskOrchestrator::with_observer(service, client_config, observer);

    task.select_path(input)
        .await
        .with_context(|| format!("Cannot use {}", input.display()))?;
    task.start(job.as_ref()).await.context("Conversion did not start")?;
    let done = task.wait_until_settled().await?;

    if done.phase == Phase::Failed {
        anyhow::bail!(
            "Conversion failed: {}",
            done.failure.as_deref().unwrap_or("unknown error")
        );
    }
    let result = done
        .result
        .clone()
        .context("Conversion completed but the result could not be fetched")?;

    // ── Outputs ──────────────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let artifact = task
            .download_markdown()
            .await
            .context("Failed to download Markdown")?;
        artifact
            .write_to(output_path)
            .await
            .context("Failed to write Markdown")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}  →  {}",
                green("✔"),
                dim(&format_elapsed(done.elapsed)),
                bold(&output_path.display().to_string())
            );
        }
    }

    if let Some(ref dir) = cli.images {
        if result.images_available() {
            let archive = task
                .download_images()
                .await
                .context("Failed to download images")?;
            let path = dir.join(&archive.file_name);
            archive
                .write_to(&path)
                .await
                .context("Failed to write image archive")?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} images  →  {}",
                    green("✔"),
                    result.image_count,
                    bold(&path.display().to_string())
                );
            }
        } else if !cli.quiet {
            eprintln!("{} no images were extracted", cyan("⚠"));
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&done).context("Failed to serialise snapshot")?
        );
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.content.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_client_config(cli: &Cli) -> Result<ClientConfig> {
    let shape = if cli.legacy_wire {
        ConfigShape::Legacy
    } else {
        ConfigShape::Current
    };
    ClientConfig::builder()
        .base_url(cli.server.clone())
        .max_file_size(cli.max_size_mb.saturating_mul(1024 * 1024))
        .poll_interval(Duration::from_millis(cli.poll_ms))
        .request_timeout(Duration::from_secs(cli.timeout))
        .wire_shape(shape)
        .validate_remotely(cli.validate)
        .build()
        .context("Invalid client configuration")
}

/// Map CLI args to the job configuration: mode defaults, then preset, then
/// `--config`, then each `--set`, then the GPU gate.
///
/// `None` when none of them picks a mode.
async fn build_job_config(
    cli: &Cli,
    service: &dyn ConversionService,
) -> Result<Option<ConfigModel>> {
    let catalog = PresetCatalog::new();
    if cli.preset.is_some() {
        catalog
            .load(service)
            .await
            .context("Failed to load presets")?;
    }
    let reconciler = ConfigReconciler::new(&catalog);

    let draft: Option<ConfigDraft> = match &cli.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid JSON in {}", path.display()))?,
            )
        }
        None => None,
    };

    let chosen_mode = cli.mode.map(ConversionMode::from);
    let implied_mode = draft
        .as_ref()
        .and_then(|d| d.conversion_mode)
        .or_else(|| cli.set.iter().find_map(FieldEdit::mode));
    if chosen_mode.is_none() && cli.preset.is_none() && implied_mode.is_none() {
        return Ok(None);
    }

    let mut config = ConfigModel::defaults_for(
        chosen_mode
            .or(implied_mode)
            .unwrap_or(ConversionMode::Marker),
    );
    if let Some(name) = &cli.preset {
        config = reconciler
            .reconcile(&config, Intent::ApplyPreset(name.clone()))
            .with_context(|| format!("Cannot apply preset '{name}'"))?;
        if let Some(mode) = chosen_mode {
            config = reconciler.reconcile(&config, Intent::SwitchMode(mode))?;
        }
    }
    if let Some(draft) = draft {
        config = reconciler
            .reconcile(&config, Intent::ApplyCustomEdits(draft))
            .context("Cannot apply --config")?;
    }
    for edit in &cli.set {
        config = reconciler
            .reconcile(&config, Intent::SetField(edit.clone()))
            .with_context(|| format!("Cannot set {}", edit.path()))?;
    }

    let wants_gpu = config.as_marker().is_some_and(|m| m.gpu.enabled);
    if wants_gpu {
        let status = match service.gpu_status().await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("GPU status unavailable: {e}");
                None
            }
        };
        let gated = gate_gpu(config.clone(), status.as_ref());
        if gated != config && !cli.quiet {
            eprintln!("{} service has no usable GPU; GPU acceleration disabled", cyan("⚠"));
        }
        config = gated;
    }

    Ok(Some(config))
}

async fn list_presets(cli: &Cli, service: &dyn ConversionService) -> Result<()> {
    let catalog = PresetCatalog::new();
    let presets = catalog
        .load(service)
        .await
        .context("Failed to load presets")?;

    if cli.json {
        let rows: Vec<_> = presets
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "description": p.description,
                    "config": p.config,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for p in presets {
        println!("{}", bold(&p.name));
        if let Some(d) = &p.description {
            println!("  {d}");
        }
        println!("  {}", dim(&advice::summary(&p.config)));
    }
    Ok(())
}

async fn print_gpu_status(cli: &Cli, service: &dyn ConversionService) -> Result<()> {
    let status = service
        .gpu_status()
        .await
        .context("Failed to query GPU status")?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    println!(
        "Available:    {}",
        if status.available { green("yes") } else { red("no") }
    );
    println!("Devices:      {}", status.device_count);
    if let Some(ref name) = status.device_name {
        println!("Device:       {name}");
    }
    if let (Some(total), Some(free)) = (status.memory_total, status.memory_free) {
        println!("Memory:       {free:.1} GiB free of {total:.1} GiB");
    }
    if let Some(ref v) = status.cuda_version {
        println!("CUDA:         {v}");
    }
    Ok(())
}

async fn check_config(
    cli: &Cli,
    client_config: &ClientConfig,
    service: Arc<dyn ConversionService>,
    job: Option<ConfigModel>,
) -> Result<()> {
    let config = job.context("Select a conversion mode (--mode, --preset or --config)")?;
    let validator = ConfigValidator::new(service, client_config.wire_shape);

    let verdict = validator.validate(&config).await.context("Validation request failed")?;
    let compatibility = validator
        .check_compatibility(&config)
        .await
        .context("Compatibility check failed")?;

    if cli.json {
        let out = serde_json::json!({
            "config": config,
            "valid": verdict.report.valid,
            "errors": verdict.report.errors,
            "warnings": verdict.report.warnings,
            "compatibility": compatibility,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", bold(&advice::summary(&config)));
        for e in &verdict.report.errors {
            println!("  {} {e}", red("✗"));
        }
        for w in verdict.report.warnings.iter().chain(&compatibility.warnings) {
            println!("  {} {w}", cyan("⚠"));
        }
        for s in advice::suggestions(&config, client_config.wire_shape) {
            println!("  {} {s}", dim("·"));
        }
        if verdict.is_valid() {
            println!("{} configuration is valid", green("✔"));
        }
    }

    if !verdict.is_valid() {
        anyhow::bail!("Invalid configuration");
    }
    Ok(())
}
