//! cutcut: Turn photos into outlined stickers from the command line.
//!
//! Three ways in:
//!
//! - `make` runs the whole pipeline once from flags: crop, erase (remote
//!   or with scripted brush strokes), add text, then download or upload.
//! - `bridge` speaks the pipeline's message protocol as line-delimited
//!   JSON on stdin/stdout, for driving the pipeline from an editor UI.
//! - `settings` reads and writes the stored bot and API credentials.
//!
//! Logs go to stderr; filter them with `CUTCUT_LOG` or `RUST_LOG`.
//!
//! # Usage
//!
//! ```text
//! cutcut make photo.jpg --crop 200,100,400,400 --erase "10,10;60,10" --text "hi" --font Inter.ttf
//! cutcut bridge < messages.jsonl
//! cutcut settings set --bot-token 123:abc --bot-id 42
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod bridge;
mod make;
mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cutcut_io::{Driver, ServiceConfig, Services, SettingsStore};
use cutcut_pipeline::{LoadedFont, Orchestrator, PipelineConfig, Settings};
use tracing_subscriber::EnvFilter;

/// Turn photos into background-clean, outlined stickers.
#[derive(Parser)]
#[command(name = "cutcut", version)]
struct Cli {
    /// Settings file (defaults to `$XDG_CONFIG_HOME/cutcut/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Make one sticker from an image file or URL.
    Make(make::MakeArgs),
    /// Exchange pipeline messages as JSON lines on stdin/stdout.
    Bridge(bridge::BridgeArgs),
    /// Show or edit stored credentials.
    #[command(subcommand)]
    Settings(settings::SettingsCommand),
}

/// Options shared by the commands that run the pipeline.
#[derive(clap::Args)]
struct PipelineArgs {
    /// Full pipeline config as a JSON string.
    ///
    /// Individual flags below are applied on top of it.
    #[arg(long)]
    config_json: Option<String>,

    /// Service endpoints as a JSON string.
    #[arg(long)]
    service_json: Option<String>,

    /// Font file for text overlays (TTF or OTF).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Outline width in pixels.
    #[arg(long)]
    stroke_width: Option<u32>,

    /// Display pixel ratio of the canvas backing store.
    #[arg(long)]
    pixel_ratio: Option<f32>,

    /// Directory downloaded stickers are written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

impl PipelineArgs {
    /// Build a [`PipelineConfig`] from `--config-json` and the override
    /// flags.
    fn pipeline_config(&self) -> Result<PipelineConfig, String> {
        let mut config = match self.config_json {
            Some(ref json) => serde_json::from_str(json)
                .map_err(|e| format!("Error parsing --config-json: {e}"))?,
            None => PipelineConfig::default(),
        };
        if let Some(width) = self.stroke_width {
            config.stroke.stroke_width_px = width;
        }
        if let Some(ratio) = self.pixel_ratio {
            config.pixel_ratio = ratio;
        }
        Ok(config)
    }

    fn service_config(&self) -> Result<ServiceConfig, String> {
        self.service_json.as_ref().map_or_else(
            || Ok(ServiceConfig::default()),
            |json| {
                serde_json::from_str(json).map_err(|e| format!("Error parsing --service-json: {e}"))
            },
        )
    }

    fn load_font(path: &Path) -> Result<LoadedFont, String> {
        let bytes =
            std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("font")
            .to_owned();
        LoadedFont::from_bytes(name, bytes).map_err(|e| e.to_string())
    }

    /// Assemble a driver around a fresh orchestrator.
    fn driver(&self) -> Result<Driver, String> {
        let mut orchestrator =
            Orchestrator::new(self.pipeline_config()?).map_err(|e| e.to_string())?;
        if let Some(ref path) = self.font {
            orchestrator = orchestrator.with_font(Self::load_font(path)?);
        }
        let services = Services::http(&self.service_config()?).map_err(|e| e.to_string())?;
        Ok(Driver::new(orchestrator, services, self.out_dir.clone()))
    }
}

fn settings_store(path: Option<&Path>) -> Result<SettingsStore, String> {
    path.map_or_else(
        || SettingsStore::default_location().map_err(|e| e.to_string()),
        |p| Ok(SettingsStore::new(p)),
    )
}

fn load_settings(store: &SettingsStore) -> Result<Option<Settings>, String> {
    store.load().map_err(|e| format!("Error loading settings: {e}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CUTCUT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Error starting runtime: {e}"))
}

fn run(cli: Cli) -> Result<(), String> {
    let store = settings_store(cli.settings.as_deref())?;
    match cli.command {
        Command::Make(args) => {
            let settings = load_settings(&store)?;
            runtime()?.block_on(make::run(&args, settings))
        }
        Command::Bridge(args) => {
            let settings = load_settings(&store)?;
            runtime()?.block_on(bridge::run(&args, &store, settings))
        }
        Command::Settings(command) => settings::run(command, &store),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
