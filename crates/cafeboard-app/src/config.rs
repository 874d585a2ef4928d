//! Whiteboard configuration.
//!
//! Loaded from an optional JSON file, then overridden by `CAFEBOARD_*`
//! environment variables. Every field has a default.

use cafeboard_core::color::parse_color;
use cafeboard_core::{DEFAULT_TEXT_ORIGIN, SHARED_BOARD_ID};
use kurbo::Point;
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteboardConfig {
    pub board_id: String,
    pub save_interval_ms: u64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub background: String,
    pub default_text_origin: Point,
    /// TrueType font for text boxes, replacing the bundled DejaVu Sans.
    pub font_path: Option<PathBuf>,
    pub export_dir: PathBuf,
    /// `ws://` or `wss://` board server. A local file store is used when absent.
    pub server_url: Option<String>,
    /// Directory of the local file store. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self {
            board_id: SHARED_BOARD_ID.to_string(),
            save_interval_ms: 1000,
            canvas_width: 1200,
            canvas_height: 800,
            background: "#ffffff".to_string(),
            default_text_origin: DEFAULT_TEXT_ORIGIN,
            font_path: None,
            export_dir: PathBuf::from("."),
            server_url: None,
            data_dir: None,
        }
    }
}

impl WhiteboardConfig {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Defaults, then the file if given, then the environment.
    pub fn resolve(path: Option<&Path>) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `CAFEBOARD_*` environment variables.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(board) = get("CAFEBOARD_BOARD") {
            self.board_id = board;
        }
        if let Some(raw) = get("CAFEBOARD_SAVE_INTERVAL_MS") {
            self.save_interval_ms = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "CAFEBOARD_SAVE_INTERVAL_MS".to_string(),
                value: raw.clone(),
            })?;
        }
        if let Some(font) = get("CAFEBOARD_FONT") {
            self.font_path = Some(PathBuf::from(font));
        }
        if let Some(dir) = get("CAFEBOARD_EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
        if let Some(url) = get("CAFEBOARD_SERVER_URL") {
            self.server_url = Some(url);
        }
        if let Some(dir) = get("CAFEBOARD_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.board_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "board_id".to_string(),
                value: self.board_id.clone(),
            });
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(ConfigError::Invalid {
                key: "canvas size".to_string(),
                value: format!("{}x{}", self.canvas_width, self.canvas_height),
            });
        }
        if parse_color(&self.background).is_none() {
            return Err(ConfigError::Invalid {
                key: "background".to_string(),
                value: self.background.clone(),
            });
        }
        Ok(())
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    pub fn background_color(&self) -> Color {
        parse_color(&self.background).unwrap_or(Color::from_rgba8(255, 255, 255, 255))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WhiteboardConfig::default();
        assert_eq!(config.board_id, "shared");
        assert_eq!(config.save_interval(), Duration::from_secs(1));
        assert_eq!(config.default_text_origin, Point::new(50.0, 50.0));
        assert!(config.server_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config =
            WhiteboardConfig::from_json(r#"{"canvas_width": 640, "export_dir": "/tmp/out"}"#)
                .unwrap();
        assert_eq!(config.canvas_width, 640);
        assert_eq!(config.canvas_height, 800);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_env_overrides() {
        let config = WhiteboardConfig::default()
            .with_overrides(env(&[
                ("CAFEBOARD_BOARD", "kitchen"),
                ("CAFEBOARD_SAVE_INTERVAL_MS", "250"),
                ("CAFEBOARD_SERVER_URL", "ws://localhost:3030/ws"),
                ("CAFEBOARD_DATA_DIR", ""),
            ]))
            .unwrap();

        assert_eq!(config.board_id, "kitchen");
        assert_eq!(config.save_interval_ms, 250);
        assert_eq!(config.server_url.as_deref(), Some("ws://localhost:3030/ws"));
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_invalid_interval_override() {
        let result = WhiteboardConfig::default()
            .with_overrides(env(&[("CAFEBOARD_SAVE_INTERVAL_MS", "soon")]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_invalid_background() {
        let result = WhiteboardConfig::from_json(r#"{"background": "beige"}"#);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cafeboard.json");
        std::fs::write(&path, r#"{"board_id": "menu"}"#).unwrap();

        assert_eq!(WhiteboardConfig::load(&path).unwrap().board_id, "menu");
        assert!(matches!(
            WhiteboardConfig::load(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
