//! Renderer configuration.
//!
//! Settings come from three layers, lowest priority first: built-in defaults,
//! an optional TOML file, and command-line overrides applied by the binary.
//!
//! # Example
//!
//! ```
//! use framepace_core::RendererConfig;
//!
//! let config = RendererConfig::from_toml_str(
//!     r#"
//!     [window]
//!     width = 1280
//!     height = 720
//!
//!     [run]
//!     max_frames = 600
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.window.width, 1280);
//! assert_eq!(config.window.title, "framepace");
//! assert_eq!(config.run.max_frames, Some(600));
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Window settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial drawable width in physical pixels.
    pub width: u32,
    /// Initial drawable height in physical pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "framepace".to_string(),
        }
    }
}

/// Vulkan instance settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VulkanConfig {
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
        }
    }
}

/// Main loop settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many presented frames. `None` runs until the window closes.
    pub max_frames: Option<u64>,
}

/// Logging settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete renderer configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    pub vulkan: VulkanConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

impl RendererConfig {
    /// Parses a configuration from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML, has wrongly typed
    /// values, or fails [`RendererConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks values that deserialization alone cannot reject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero window dimension or a zero frame limit.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.run.max_frames == Some(0) {
            return Err(Error::Config("max_frames must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.run.max_frames, None);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_partial_section() {
        let config = RendererConfig::from_toml_str(
            r#"
            [vulkan]
            validation = false

            [logging]
            filter = "warn"
            "#,
        )
        .unwrap();
        assert!(!config.vulkan.validation);
        assert_eq!(config.logging.filter, "warn");
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = RendererConfig::from_toml_str("[window]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_frame_limit_rejected() {
        let err = RendererConfig::from_toml_str("[run]\nmax_frames = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = RendererConfig::from_toml_str("[window]\nwidth = \"wide\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RendererConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
