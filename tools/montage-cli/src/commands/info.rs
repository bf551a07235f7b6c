//! Show edit document information.

use std::path::PathBuf;

use montage_edit_model::EditProject;
use serde::Serialize;

#[derive(Serialize)]
struct Summary<'a> {
    name: &'a str,
    version: &'a str,
    created_at: &'a str,
    modified_at: &'a str,
    video_clips: usize,
    audio_tracks: usize,
    text_overlays: usize,
    duration_secs: f64,
    filter: Option<&'static str>,
    width: u32,
    height: u32,
    fps: u32,
}

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let p =
        EditProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load document: {e}"))?;

    if json {
        let summary = Summary {
            name: &p.name,
            version: &p.version,
            created_at: &p.created_at,
            modified_at: &p.modified_at,
            video_clips: p.video_clips.len(),
            audio_tracks: p.audio_tracks.len(),
            text_overlays: p.text_overlays.len(),
            duration_secs: p.duration_secs(),
            filter: p.filter.map(|f| f.filter_type.name()),
            width: p.export.width,
            height: p.export.height,
            fps: p.export.fps,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Document: {}", p.name);
    println!("  Version: {}", p.version);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!("  Duration: {:.1}s", p.duration_secs());
    println!();

    println!("Video clips:");
    for clip in &p.video_clips {
        println!(
            "  {} at {:.1}s ({:.1}s from {:.1}s)",
            clip.path.display(),
            clip.position_secs,
            clip.duration_secs,
            clip.start_secs
        );
    }
    println!("Audio tracks:");
    for track in &p.audio_tracks {
        println!(
            "  {} at {:.1}s ({:.1}s)",
            track.path.display(),
            track.position_secs,
            track.duration_secs
        );
    }
    println!("Text overlays:");
    for overlay in &p.text_overlays {
        println!(
            "  \"{}\" at {:.1}s for {:.1}s, ({}, {}) size {} {}",
            overlay.text,
            overlay.position_secs,
            overlay.duration_secs,
            overlay.x,
            overlay.y,
            overlay.font_size,
            overlay.color
        );
    }
    println!();

    match p.filter {
        Some(f) => println!("Filter: {} ({})", f.filter_type.name(), f.value),
        None => println!("Filter: none"),
    }
    println!(
        "Export: {}x{} @ {}fps",
        p.export.width, p.export.height, p.export.fps
    );

    Ok(())
}
