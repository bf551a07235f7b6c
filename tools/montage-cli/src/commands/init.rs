//! Create a sample edit document.

use std::path::{Path, PathBuf};

use montage_common::config::AppConfig;
use montage_edit_model::{
    AudioTrack, EditProject, ExportSettings, FilterSpec, FilterType, TextOverlay, VideoClip,
};

pub fn run(config: &AppConfig, name: String, output: PathBuf) -> anyhow::Result<()> {
    let path = output.join(format!("{name}.json"));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    let project = sample_project(&name, config);
    project
        .save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write document: {e}"))?;

    println!("Created edit document '{}' at {}", name, path.display());
    println!(
        "  Export: {}x{} @ {}fps",
        project.export.width, project.export.height, project.export.fps
    );
    println!("  Items: {}", project.item_count());
    println!();
    println!("Replace the sample media paths, then run:");
    println!("  montage render {}", display_relative(&path));

    Ok(())
}

/// A document with one item of each kind, laid out the way a fresh edit
/// usually starts.
pub(crate) fn sample_project(name: &str, config: &AppConfig) -> EditProject {
    let mut project = EditProject::new(name);
    project.export = ExportSettings {
        width: config.export.width,
        height: config.export.height,
        fps: config.export.fps,
    };

    for file in ["media/intro.mp4", "media/main.mp4"] {
        let position = project.next_video_position();
        project
            .video_clips
            .push(VideoClip::new(file, 10.0, position));
    }
    project
        .audio_tracks
        .push(AudioTrack::new("media/music.mp3", 30.0, 0.0));
    project
        .text_overlays
        .push(TextOverlay::new("Sample Text", 0.0, 5.0));
    project.filter = Some(FilterSpec::new(FilterType::None, 1.0));
    project
}

fn display_relative(path: &Path) -> String {
    path.strip_prefix(".")
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_project_is_valid() {
        let project = sample_project("demo", &AppConfig::default());
        assert!(project.validate().is_empty());
        assert_eq!(project.video_clips[1].position_secs, 10.0);
        assert_eq!(project.export, ExportSettings::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::default();
        run(&config, "demo".into(), dir.path().to_path_buf()).unwrap();
        assert!(dir.path().join("demo.json").exists());
        assert!(run(&config, "demo".into(), dir.path().to_path_buf()).is_err());
    }
}
