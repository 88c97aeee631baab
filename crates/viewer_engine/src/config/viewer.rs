//! # Viewer Configuration
//!
//! Window, renderer and asset settings for the model viewer. Every section has
//! defaults matching the stock viking-room scene, so an absent or partial
//! config file still produces a runnable setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{Config, ConfigError};

/// Window creation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Vulkan renderer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Number of frames the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Validation layers requested when validation is enabled
    pub validation_layers: Vec<String>,
    /// Force the legacy render-pass backend; `None` picks per platform
    pub compatibility_mode: Option<bool>,
}

impl RendererConfig {
    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Force compatibility (legacy render pass) mode on or off
    pub fn with_compatibility_mode(mut self, enabled: bool) -> Self {
        self.compatibility_mode = Some(enabled);
        self
    }

    /// Validation setting after resolving the build-type default
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Compatibility setting after resolving the platform default
    ///
    /// Linux defaults to compatibility mode so software rasterizers such as
    /// llvmpipe remain usable.
    pub fn compatibility_enabled(&self) -> bool {
        self.compatibility_mode.unwrap_or(cfg!(target_os = "linux"))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Model Viewer".to_string(),
            max_frames_in_flight: 2,
            enable_validation: None,
            validation_layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            compatibility_mode: None,
        }
    }
}

/// Asset locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// OBJ model path
    pub model_path: PathBuf,
    /// Texture image path
    pub texture_path: PathBuf,
    /// Compiled SPIR-V module exposing `vertMain` and `fragMain`
    pub shader_path: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/viking_room.obj"),
            texture_path: PathBuf::from("textures/viking_room.png"),
            shader_path: PathBuf::from("shaders/slang.spv"),
        }
    }
}

/// Top-level viewer configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Asset paths
    pub assets: AssetConfig,
}

impl Config for ViewerConfig {}

impl ViewerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be nonzero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.renderer.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }

        if self.renderer.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid("max frames in flight must be at least 1".to_string()));
        }

        if self.renderer.max_frames_in_flight > 8 {
            return Err(ConfigError::Invalid("max frames in flight should not exceed 8".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_defaults_match_stock_scene() {
        let config = ViewerConfig::default();
        assert_eq!(config.window.title, "Vulkan");
        assert_eq!((config.window.width, config.window.height), (800, 600));
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert_eq!(config.renderer.validation_layers, vec!["VK_LAYER_KHRONOS_validation"]);
        assert_eq!(config.assets.model_path, PathBuf::from("models/viking_room.obj"));
        assert_eq!(config.assets.texture_path, PathBuf::from("textures/viking_room.png"));
        assert_eq!(config.assets.shader_path, PathBuf::from("shaders/slang.spv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            [window]
            width = 1024

            [renderer]
            compatibility_mode = true
        "#;
        let config = ViewerConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert!(config.renderer.compatibility_enabled());
        assert_eq!(config.renderer.max_frames_in_flight, 2);
    }

    #[test]
    fn test_ron_parsing() {
        let text = r#"(renderer: (max_frames_in_flight: 3, enable_validation: Some(false)))"#;
        let config = ViewerConfig::from_str_with_format(text, ConfigFormat::Ron).unwrap();
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert!(!config.renderer.validation_enabled());
    }

    #[test]
    fn test_validation_rejects_zero_frames() {
        let mut config = ViewerConfig::default();
        config.renderer = config.renderer.with_max_frames_in_flight(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = ViewerConfig::default();
        config.window.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let renderer = RendererConfig::default()
            .with_validation(true)
            .with_compatibility_mode(false);
        assert!(renderer.validation_enabled());
        assert!(!renderer.compatibility_enabled());
    }

    #[test]
    fn test_save_and_load_roundtrip_toml() {
        let path = std::env::temp_dir().join("viewer_engine_config_test.toml");
        let mut config = ViewerConfig::default();
        config.window.title = "Roundtrip".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = ViewerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = ViewerConfig::load_from_file("viewer.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
