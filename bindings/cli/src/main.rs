//! Command-line front end for the facemoji pipeline.
//!
//! Usage:
//!   facemoji generate photo.jpg --style panda     # writes results/emoji_panda_<ts>.png
//!   facemoji templates list --json
//!   facemoji templates add robot robot.png --display-name Robot
//!   facemoji sweep

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facemoji::{
    EmojiPipeline, EmojiRequest, PipelineConfig, ResultStore, RustfaceLocator, TemplateInfo,
    TemplateRegistry, ToneParams, UploadStore,
};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "facemoji")]
#[command(version, about = "Turn a portrait photo into a stylised face emoji", long_about = None)]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding style templates
    #[arg(long, global = true, value_name = "DIR", default_value = "styles")]
    styles: PathBuf,

    /// Directory for staged uploads
    #[arg(long, global = true, value_name = "DIR", default_value = "uploads")]
    uploads: PathBuf,

    /// Directory for generated emoji
    #[arg(long, global = true, value_name = "DIR", default_value = "results")]
    results: PathBuf,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an emoji from a photo
    Generate {
        /// Input photo (jpg, jpeg, png or gif)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Template style
        #[arg(short, long, default_value = facemoji::DEFAULT_STYLE)]
        style: String,

        /// SeetaFace frontal model
        #[arg(long, value_name = "FILE", default_value = "seeta_fd_frontal_v1.0.bin")]
        model: PathBuf,

        /// Output file (default: a timestamped file in the results directory)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// How far bright pixels move toward white (0-100) [default: 50]
        #[arg(long)]
        brighten: Option<f32>,

        /// How far dark pixels move toward black (0-100) [default: 50]
        #[arg(long)]
        darken: Option<f32>,

        /// Share of pixels treated as dark (0-100) [default: 30]
        #[arg(long)]
        low_cutoff: Option<f32>,

        /// Share of pixels treated as bright (0-100) [default: 20]
        #[arg(long)]
        high_cutoff: Option<f32>,

        /// Border cleanup inset in pixels (0-100)
        #[arg(long, default_value = "3")]
        border: u32,
    },

    /// Manage style templates
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Remove stale uploads and old results
    Sweep {
        /// Remove results older than this many hours (default: keep results)
        #[arg(long, value_name = "HOURS")]
        results_older_than: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    /// List registered styles
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a custom template
    Add {
        /// Style name (a-z, 0-9, '-', '_')
        name: String,

        /// Template image
        image: PathBuf,

        /// Human-readable name
        #[arg(long)]
        display_name: Option<String>,

        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Remove a custom template
    Remove {
        /// Style name
        name: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "facemoji=debug,facemoji_cli=debug" } else { "facemoji=info,facemoji_cli=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Tone parameters from the command line; unset flags keep the library
/// defaults.
fn tone_params(
    brighten: Option<f32>,
    darken: Option<f32>,
    low_cutoff: Option<f32>,
    high_cutoff: Option<f32>,
) -> ToneParams {
    let defaults = ToneParams::default();
    ToneParams {
        brighten_factor: brighten.unwrap_or(defaults.brighten_factor),
        darken_factor: darken.unwrap_or(defaults.darken_factor),
        low_cutoff_percent: low_cutoff.unwrap_or(defaults.low_cutoff_percent),
        high_cutoff_percent: high_cutoff.unwrap_or(defaults.high_cutoff_percent),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Generate {
            input,
            style,
            model,
            out,
            brighten,
            darken,
            low_cutoff,
            high_cutoff,
            border,
        } => {
            let tone = tone_params(brighten, darken, low_cutoff, high_cutoff);
            let request = EmojiRequest::new(style).tone(tone).border_cleanup_pixels(border);
            cmd_generate(&cli.styles, &cli.uploads, &cli.results, config, &input, &model, out, &request)
        }
        Commands::Templates { action } => cmd_templates(&cli.styles, action),
        Commands::Sweep { results_older_than } => {
            cmd_sweep(&cli.uploads, &cli.results, &config, results_older_than)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_generate(
    styles: &Path,
    uploads: &Path,
    results: &Path,
    config: PipelineConfig,
    input: &Path,
    model: &Path,
    out: Option<PathBuf>,
    request: &EmojiRequest,
) -> Result<()> {
    let filename = input
        .file_name()
        .and_then(|n| n.to_str())
        .context("input path has no file name")?;
    let bytes = std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;

    let store = UploadStore::new(uploads, &config.uploads)?;
    let staged = store.stage(filename, &bytes)?;

    let locator = RustfaceLocator::from_path(model)
        .with_context(|| format!("failed to load face model {}", model.display()))?;
    let registry = Arc::new(TemplateRegistry::open(styles)?);
    let pipeline = EmojiPipeline::new(config, Box::new(locator), registry);

    let emoji = pipeline.generate_from_upload(staged, request)?;

    let path = match out {
        Some(path) => {
            std::fs::write(&path, &emoji.png)
                .with_context(|| format!("failed to write {}", path.display()))?;
            path
        }
        None => ResultStore::new(results)?.save(&emoji.png, &emoji.style)?,
    };

    if emoji.used_fallback {
        println!("No template for '{}', rendered the fallback canvas.", emoji.style);
    }
    println!(
        "{} ({}x{}, confidence {:.2})",
        path.display(),
        emoji.width,
        emoji.height,
        emoji.confidence
    );
    Ok(())
}

fn cmd_templates(styles: &Path, action: TemplateAction) -> Result<()> {
    let registry = TemplateRegistry::open(styles)?;
    match action {
        TemplateAction::List { json } => {
            let list = registry.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No templates in {}", styles.display());
            } else {
                for t in &list {
                    let kind = if t.builtin { "built-in" } else { "custom" };
                    println!("{:<16} {:<24} {:>4}x{:<4} {kind}", t.name, t.display_name, t.width, t.height);
                }
            }
        }
        TemplateAction::Add {
            name,
            image,
            display_name,
            description,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let decoded = facemoji::decode_image(&bytes)?.to_rgba8();
            let info = TemplateInfo {
                display_name: display_name.unwrap_or_default(),
                description,
            };
            let template = registry.put(&name, decoded, info)?;
            info!(style = %template.name, "template registered");
            println!("Added template '{}'", template.name);
        }
        TemplateAction::Remove { name } => {
            registry.delete(&name)?;
            println!("Removed template '{name}'");
        }
    }
    Ok(())
}

fn cmd_sweep(
    uploads: &Path,
    results: &Path,
    config: &PipelineConfig,
    results_older_than: Option<u64>,
) -> Result<()> {
    let store = UploadStore::new(uploads, &config.uploads)?;
    let removed = store.sweep_stale()?;
    println!("Removed {removed} stale upload(s) from {}", uploads.display());

    if let Some(hours) = results_older_than {
        let results_store = ResultStore::new(results)?;
        let removed = results_store.sweep_stale(Duration::from_secs(hours.saturating_mul(3600)))?;
        println!("Removed {removed} result(s) from {}", results.display());
    }
    Ok(())
}
