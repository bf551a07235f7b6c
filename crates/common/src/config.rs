//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine backend settings.
    pub engine: EngineConfig,

    /// Default export parameters.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Which engine implementation drives the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineBackend {
    /// In-process reference engine.
    #[default]
    Simulated,
    /// The native `VideoEngine` shared library.
    Native,
}

impl std::str::FromStr for EngineBackend {
    type Err = crate::error::MontageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulated" | "sim" => Ok(Self::Simulated),
            "native" => Ok(Self::Native),
            other => Err(crate::error::MontageError::config(format!(
                "Unknown engine backend: {other}. Use: simulated, native"
            ))),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend to open sessions against.
    pub backend: EngineBackend,

    /// Capacity of the buffer handed to the engine's last-error query.
    pub error_buffer_len: usize,

    /// Delay between progress steps of the simulated engine.
    pub simulated_step_delay_ms: u64,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "montage_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

/// Default capacity for last-error messages.
pub const DEFAULT_ERROR_BUFFER_LEN: usize = 1024;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            error_buffer_len: DEFAULT_ERROR_BUFFER_LEN,
            simulated_step_delay_ms: 20,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from `path`, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("montage").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(config.engine.error_buffer_len, DEFAULT_ERROR_BUFFER_LEN);
        assert_eq!(config.engine.backend, EngineBackend::Simulated);
        assert_eq!(config.export.fps, 30);
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.engine.backend = EngineBackend::Native;
        config.engine.error_buffer_len = 256;
        config.logging.level = "debug".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.engine.backend, EngineBackend::Native);
        assert_eq!(loaded.engine.error_buffer_len, 256);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"export": {"width": 1280}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.width, 1280);
        assert_eq!(config.export.height, 1080);
        assert_eq!(config.engine.simulated_step_delay_ms, 20);
    }

    #[test]
    fn test_unparsable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.width, 1920);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(
            "native".parse::<EngineBackend>().unwrap(),
            EngineBackend::Native
        );
        assert_eq!(
            "sim".parse::<EngineBackend>().unwrap(),
            EngineBackend::Simulated
        );
        assert!("gpu".parse::<EngineBackend>().is_err());
    }
}
