//! The edit document.
//!
//! An edit project collects the items that were accepted by the engine,
//! the active filter, and the export settings. It is saved as a single
//! pretty-printed JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::item::{AudioTrack, FilterSpec, TextOverlay, VideoClip};

/// Current document schema version.
pub const SCHEMA_VERSION: &str = "1.0";

/// Top-level edit document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditProject {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    #[serde(default)]
    pub video_clips: Vec<VideoClip>,

    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,

    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    /// Filter applied to the whole output. The engine keeps one filter per
    /// timeline, so applying another replaces it.
    #[serde(default)]
    pub filter: Option<FilterSpec>,

    #[serde(default)]
    pub export: ExportSettings,
}

/// Output frame geometry and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
        }
    }
}

impl EditProject {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: SCHEMA_VERSION.to_string(),
            name: name.into(),
            created_at: now.clone(),
            modified_at: now,
            video_clips: vec![],
            audio_tracks: vec![],
            text_overlays: vec![],
            filter: None,
            export: ExportSettings::default(),
        }
    }

    /// Load a project from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save the project as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Refresh `modified_at`.
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }

    /// Total number of timeline items.
    pub fn item_count(&self) -> usize {
        self.video_clips.len() + self.audio_tracks.len() + self.text_overlays.len()
    }

    /// Timeline position directly after the last video clip.
    pub fn next_video_position(&self) -> f64 {
        self.video_clips
            .iter()
            .map(VideoClip::end_secs)
            .fold(0.0, f64::max)
    }

    /// Timeline length covered by clips, audio, and overlays.
    pub fn duration_secs(&self) -> f64 {
        let audio = self
            .audio_tracks
            .iter()
            .map(|t| t.position_secs + t.duration_secs);
        let text = self
            .text_overlays
            .iter()
            .map(|t| t.position_secs + t.duration_secs);
        audio
            .chain(text)
            .fold(self.next_video_position(), f64::max)
    }

    /// Check the document for values the engine would reject or misplace.
    /// Returns one message per issue; an empty list means the document is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = vec![];

        let check_span = |label: String, start: f64, duration: f64, position: f64, issues: &mut Vec<String>| {
            if !start.is_finite() || start < 0.0 {
                issues.push(format!("{label}: start must be >= 0 (got {start})"));
            }
            if !duration.is_finite() || duration <= 0.0 {
                issues.push(format!("{label}: duration must be > 0 (got {duration})"));
            }
            if !position.is_finite() || position < 0.0 {
                issues.push(format!("{label}: position must be >= 0 (got {position})"));
            }
        };

        for (i, clip) in self.video_clips.iter().enumerate() {
            let label = format!("Video clip {i}");
            if clip.path.as_os_str().is_empty() {
                issues.push(format!("{label}: path is empty"));
            }
            check_span(label, clip.start_secs, clip.duration_secs, clip.position_secs, &mut issues);
        }

        for (i, track) in self.audio_tracks.iter().enumerate() {
            let label = format!("Audio track {i}");
            if track.path.as_os_str().is_empty() {
                issues.push(format!("{label}: path is empty"));
            }
            check_span(label, track.start_secs, track.duration_secs, track.position_secs, &mut issues);
        }

        for (i, overlay) in self.text_overlays.iter().enumerate() {
            let label = format!("Text overlay {i}");
            if overlay.text.is_empty() {
                issues.push(format!("{label}: text is empty"));
            }
            if overlay.font_size <= 0 {
                issues.push(format!(
                    "{label}: font size must be > 0 (got {})",
                    overlay.font_size
                ));
            }
            check_span(label, 0.0, overlay.duration_secs, overlay.position_secs, &mut issues);
        }

        if let Some(filter) = &self.filter {
            if !filter.value.is_finite() {
                issues.push(format!("Filter {}: value is not finite", filter.filter_type.name()));
            }
        }

        if self.export.width == 0 || self.export.height == 0 {
            issues.push(format!(
                "Export resolution must be positive (got {}x{})",
                self.export.width, self.export.height
            ));
        }
        if self.export.fps == 0 {
            issues.push("Export fps must be positive".to_string());
        }

        issues
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}
