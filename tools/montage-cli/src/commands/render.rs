//! Render an edit document through the engine.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use montage_common::config::{AppConfig, EngineBackend};
use montage_edit_model::{EditProject, ExportSettings};
use montage_engine::{open_runtime, Editor, ExportOutcome, ExportRequest};
use serde::Serialize;

/// Command-line overrides for a render.
#[derive(Debug, Default)]
pub struct RenderOptions {
    pub output: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub backend: Option<EngineBackend>,
    pub report: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RenderReport<'a> {
    document: &'a Path,
    output: &'a Path,
    backend: EngineBackend,
    width: u32,
    height: u32,
    fps: u32,
    items: usize,
    elapsed_secs: f64,
    outcome: &'a ExportOutcome,
}

pub async fn run(config: &AppConfig, path: PathBuf, options: RenderOptions) -> anyhow::Result<()> {
    println!("Rendering document at: {}", path.display());

    let project =
        EditProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load document: {e}"))?;
    let issues = project.validate();
    if !issues.is_empty() {
        for issue in &issues {
            println!("  - {issue}");
        }
        anyhow::bail!("document has {} validation issue(s)", issues.len());
    }

    let mut engine = config.engine.clone();
    if let Some(backend) = options.backend {
        engine.backend = backend;
    }
    let settings = resolve_settings(project.export, &options);
    let output = options
        .output
        .clone()
        .unwrap_or_else(|| path.with_extension("mp4"));

    let runtime = open_runtime(&engine)?;
    let editor = Editor::from_project(runtime, &project)?;

    println!("  Backend: {:?}", engine.backend);
    println!("  Output: {}", output.display());
    println!(
        "  Resolution: {}x{} @ {}fps",
        settings.width, settings.height, settings.fps
    );

    let started = Instant::now();
    let request = ExportRequest::from_settings(&output, &settings).with_progress(|percent| {
        print!("\r  Progress: {percent:3}%  ");
        let _ = std::io::stdout().flush();
    });
    let task = editor.export(request)?;

    let token = task.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling export...");
            token.cancel();
        }
    });

    let outcome = task.wait().await;
    interrupt.abort();
    let elapsed_secs = started.elapsed().as_secs_f64();
    editor.close().await;

    match &outcome {
        ExportOutcome::Completed => {
            println!("\nExport complete: {} ({elapsed_secs:.1}s)", output.display())
        }
        ExportOutcome::Cancelled => println!("\nExport cancelled."),
        ExportOutcome::Failed(message) => println!("\nExport failed: {message}"),
    }

    if let Some(report_path) = &options.report {
        let report = RenderReport {
            document: &path,
            output: &output,
            backend: engine.backend,
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            items: editor.project().item_count(),
            elapsed_secs,
            outcome: &outcome,
        };
        std::fs::write(report_path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %report_path.display(), "Render report written");
    }

    outcome.into_result()?;
    Ok(())
}

fn resolve_settings(document: ExportSettings, options: &RenderOptions) -> ExportSettings {
    ExportSettings {
        width: options.width.unwrap_or(document.width),
        height: options.height.unwrap_or(document.height),
        fps: options.fps.unwrap_or(document.fps),
    }
}
