//! Montage CLI: command-line interface for edit documents and rendering.
//!
//! Usage:
//!   montage init <NAME>        Create a sample edit document
//!   montage validate <PATH>    Check an edit document for problems
//!   montage info <PATH>        Show document information
//!   montage render <PATH>      Replay a document into the engine and export it
//!   montage check              Report available engine backends

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use montage_common::config::{AppConfig, EngineBackend};

mod commands;

#[derive(Parser)]
#[command(
    name = "montage",
    about = "Timeline editing and export through a native video engine",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a sample edit document
    Init {
        /// Project name
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Validate an edit document
    Validate {
        /// Path to the document
        path: PathBuf,
    },

    /// Show document information
    Info {
        /// Path to the document
        path: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a document into the engine and export it
    Render {
        /// Path to the document
        path: PathBuf,

        /// Output file path (defaults to the document path with .mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output width (overrides the document)
        #[arg(long)]
        width: Option<u32>,

        /// Output height (overrides the document)
        #[arg(long)]
        height: Option<u32>,

        /// Output frame rate (overrides the document)
        #[arg(long)]
        fps: Option<u32>,

        /// Engine backend: simulated|native
        #[arg(long)]
        backend: Option<EngineBackend>,

        /// Write a JSON report of the export outcome
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Report available engine backends
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    montage_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init { name, output } => commands::init::run(&config, name, output),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Info { path, json } => commands::info::run(path, json),
        Commands::Render {
            path,
            output,
            width,
            height,
            fps,
            backend,
            report,
        } => {
            let options = commands::render::RenderOptions {
                output,
                width,
                height,
                fps,
                backend,
                report,
            };
            commands::render::run(&config, path, options).await
        }
        Commands::Check => commands::check::run(&config),
    }
}
