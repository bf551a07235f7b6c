//! Timeline items.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// A video clip placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    /// Source media file.
    pub path: PathBuf,

    /// Offset into the source where playback starts (seconds).
    #[serde(default)]
    pub start_secs: f64,

    /// Playback duration (seconds).
    pub duration_secs: f64,

    /// Where the clip sits on the timeline (seconds).
    #[serde(default)]
    pub position_secs: f64,
}

/// A background audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Source audio file.
    pub path: PathBuf,

    /// Offset into the source where playback starts (seconds).
    #[serde(default)]
    pub start_secs: f64,

    /// Playback duration (seconds).
    pub duration_secs: f64,

    /// Where the track sits on the timeline (seconds).
    #[serde(default)]
    pub position_secs: f64,
}

/// Text drawn over the video, e.g. a caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,

    /// First timeline second the text is visible.
    #[serde(default)]
    pub position_secs: f64,

    /// How long the text stays visible (seconds).
    pub duration_secs: f64,

    /// Top-left anchor in output pixels.
    pub x: i32,
    pub y: i32,

    pub font_size: i32,

    #[serde(default)]
    pub color: Color,
}

/// Filters the engine can apply to the rendered output.
///
/// Discriminants are the engine's wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum FilterType {
    #[default]
    None = 0,
    Grayscale = 1,
    Brightness = 2,
}

impl FilterType {
    /// The integer passed across the engine boundary.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Brightness => "brightness",
        }
    }
}

impl std::str::FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "grayscale" | "greyscale" => Ok(Self::Grayscale),
            "brightness" => Ok(Self::Brightness),
            other => Err(format!(
                "Unknown filter: {other}. Use: none, grayscale, brightness"
            )),
        }
    }
}

/// A filter together with its strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub filter_type: FilterType,

    /// Filter strength; on/off filters use `1.0`.
    #[serde(default = "default_filter_value")]
    pub value: f64,
}

fn default_filter_value() -> f64 {
    1.0
}

impl FilterSpec {
    pub fn new(filter_type: FilterType, value: f64) -> Self {
        Self { filter_type, value }
    }
}

impl VideoClip {
    pub fn new(path: impl Into<PathBuf>, duration_secs: f64, position_secs: f64) -> Self {
        Self {
            path: path.into(),
            start_secs: 0.0,
            duration_secs,
            position_secs,
        }
    }

    /// Timeline second at which the clip ends.
    pub fn end_secs(&self) -> f64 {
        self.position_secs + self.duration_secs
    }
}

impl AudioTrack {
    pub fn new(path: impl Into<PathBuf>, duration_secs: f64, position_secs: f64) -> Self {
        Self {
            path: path.into(),
            start_secs: 0.0,
            duration_secs,
            position_secs,
        }
    }
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, position_secs: f64, duration_secs: f64) -> Self {
        Self {
            text: text.into(),
            position_secs,
            duration_secs,
            x: 100,
            y: 100,
            font_size: 24,
            color: Color::WHITE,
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_font_size(mut self, font_size: i32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_codes_match_engine() {
        assert_eq!(FilterType::None.code(), 0);
        assert_eq!(FilterType::Grayscale.code(), 1);
        assert_eq!(FilterType::Brightness.code(), 2);
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("Grayscale".parse::<FilterType>(), Ok(FilterType::Grayscale));
        assert_eq!("greyscale".parse::<FilterType>(), Ok(FilterType::Grayscale));
        assert!("sepia".parse::<FilterType>().is_err());
    }

    #[test]
    fn test_text_overlay_defaults_to_white() {
        let overlay = TextOverlay::new("Sample Text", 0.0, 5.0);
        assert_eq!(overlay.color.to_hex(), "#FFFFFF");
        assert_eq!(overlay.font_size, 24);
    }

    #[test]
    fn test_overlay_deserializes_without_color() {
        let json = r#"{"text":"hi","duration_secs":2.0,"x":1,"y":2,"font_size":12}"#;
        let overlay: TextOverlay = serde_json::from_str(json).unwrap();
        assert_eq!(overlay.color, Color::WHITE);
        assert_eq!(overlay.position_secs, 0.0);
    }

    #[test]
    fn test_filter_spec_value_defaults_to_one() {
        let spec: FilterSpec = serde_json::from_str(r#"{"filter_type":"grayscale"}"#).unwrap();
        assert_eq!(spec, FilterSpec::new(FilterType::Grayscale, 1.0));
    }
}
