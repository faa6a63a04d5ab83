//! TOML configuration for the presenter.
//!
//! Every key is optional; a missing file or a missing table falls back to
//! the defaults below.
//!
//! ```toml
//! [window]
//! width = 800
//! height = 600
//! title = "Hello Vulkan"
//!
//! [render]
//! frames_in_flight = 2
//! present_mode = "mailbox"
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [shaders]
//! vertex = "shaders/hello.vert.spv"
//! fragment = "shaders/hello.frag.spv"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Upper bound accepted for `render.frames_in_flight`.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 4;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub shaders: ShaderConfig,
}

/// Initial window parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Hello Vulkan".to_string(),
            resizable: true,
        }
    }
}

/// Preferred presentation mode. FIFO is always the fallback.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Low-latency mailbox presentation when the surface offers it
    #[default]
    Mailbox,
    /// Always vsync
    Fifo,
}

/// Frame pacing and draw parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of frame slots (`N`).
    pub frames_in_flight: usize,
    pub present_mode: PresentModePreference,
    pub clear_color: [f32; 4],
    /// Vertices emitted by the single draw call.
    pub vertex_count: u32,
    /// Enable validation layers; `None` follows the build profile.
    pub validation: Option<bool>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            present_mode: PresentModePreference::Mailbox,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_count: 3,
            validation: None,
        }
    }
}

impl RenderConfig {
    /// Whether validation layers should be requested.
    pub fn validation_enabled(&self) -> bool {
        self.validation.unwrap_or(cfg!(debug_assertions))
    }
}

/// SPIR-V blob locations.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub entry_point: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/hello.vert.spv"),
            fragment: PathBuf::from("shaders/hello.frag.spv"),
            entry_point: "main".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let frames = self.render.frames_in_flight;
        if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(Error::Config(format!(
                "render.frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT_LIMIT, frames
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.render.vertex_count == 0 {
            return Err(Error::Config(
                "render.vertex_count must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_program() {
        let config = Config::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Hello Vulkan");
        assert_eq!(config.render.frames_in_flight, 2);
        assert_eq!(config.render.vertex_count, 3);
        assert_eq!(config.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/hello.vert.spv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_tables_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            width = 1280

            [render]
            present_mode = "fifo"
            validation = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.render.present_mode, PresentModePreference::Fifo);
        assert!(!config.render.validation_enabled());
        assert_eq!(config.render.frames_in_flight, 2);
    }

    #[test]
    fn test_rejects_out_of_range_frames() {
        let err = Config::from_toml_str("[render]\nframes_in_flight = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_toml_str("[render]\nframes_in_flight = 9\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_window() {
        let err = Config::from_toml_str("[window]\nheight = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_present_mode() {
        let err = Config::from_toml_str("[render]\npresent_mode = \"immediate\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(Path::new("definitely/not/here/framepace.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
