//! Camera and recorder configuration.
//!
//! The camera configuration is fixed for a session. Re-configuring resets
//! every buffer derived from it, so the integration detector tuning lives
//! here alongside the geometry.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aav::ImageLayoutChoice;
use crate::integration::MonochromeMode;

/// Configuration of the analogue video source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Camera model, written to the AAV header.
    pub model: String,
    /// How a 24-bit source pixel is reduced to one mono channel.
    pub mono_mode: MonochromeMode,
    /// Mirror the preview image horizontally.
    pub flip_horizontal: bool,
    /// Mirror the preview image vertically.
    pub flip_vertical: bool,
    /// Whether the camera integrates several video frames per exposure.
    pub is_integrating: bool,
    /// Multiple of the running sigma a signature must exceed to start a
    /// new integration period.
    pub signature_difference_factor: f32,
    /// Absolute difference a signature must exceed to start a new
    /// integration period.
    pub minimum_signature_difference: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 576, // PAL
            model: "Unknown".to_string(),
            mono_mode: MonochromeMode::R,
            flip_horizontal: false,
            flip_vertical: false,
            is_integrating: true,
            signature_difference_factor: 3.0,
            minimum_signature_difference: 1.0,
        }
    }
}

impl CameraConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Bytes per source scanline (24-bit pixels).
    #[inline]
    pub fn stride(&self) -> usize {
        3 * self.width as usize
    }

    /// Total pixels in a frame.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Size in bytes of a source frame buffer.
    #[inline]
    pub fn source_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > u16::MAX as u32 || self.height > u16::MAX as u32 {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !(self.signature_difference_factor > 0.0) {
            return Err(ConfigError::InvalidSignatureFactor(
                self.signature_difference_factor,
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The signature difference factor is not positive.
    #[error("signature difference factor must be positive, got {0}")]
    InvalidSignatureFactor(f32),
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Camera geometry and integration detection.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Recording layout and queue settings.
    #[serde(default)]
    pub recording: RecordingConfig,
    /// Metrics exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Image layout used for every recorded frame.
    pub image_layout: ImageLayoutChoice,
    /// Frames the recording queue may hold before recording is aborted.
    pub queue_capacity: usize,
    /// Key frame interval of the differential layout.
    pub key_frame_interval: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            image_layout: ImageLayoutChoice::Differential,
            queue_capacity: 1024,
            key_frame_interval: 32,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 0 }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.camera.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CameraConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stride(), 3 * 720);
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = CameraConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_non_positive_factor_invalid() {
        let mut config = CameraConfig::default();
        config.signature_difference_factor = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSignatureFactor(_))
        ));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [camera]
            width = 640
            height = 480
            model = "WAT-910BD"
            mono_mode = "luma"
            flip_horizontal = false
            flip_vertical = true
            is_integrating = true
            signature_difference_factor = 2.5
            minimum_signature_difference = 0.5

            [recording]
            image_layout = "compressed"
            queue_capacity = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.camera.model, "WAT-910BD");
        assert_eq!(config.camera.mono_mode, MonochromeMode::Luma);
        assert_eq!(config.recording.image_layout, ImageLayoutChoice::Compressed);
        assert_eq!(config.recording.queue_capacity, 64);
        assert_eq!(config.recording.key_frame_interval, 32);
        assert_eq!(config.metrics.port, 0);
    }

    #[test]
    fn test_invalid_camera_section_rejected() {
        let result = FileConfig::from_toml(
            r#"
            [camera]
            width = 0
            height = 480
            model = "x"
            mono_mode = "r"
            flip_horizontal = false
            flip_vertical = false
            is_integrating = false
            signature_difference_factor = 1.0
            minimum_signature_difference = 1.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidDimensions { .. })));
    }
}
