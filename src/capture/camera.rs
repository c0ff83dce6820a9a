//! Frame source abstraction.
//!
//! Real capture drivers sit outside this crate. The mock camera simulates
//! an integrating analogue camera: the scene brightness changes once per
//! exposure and every video frame of that exposure repeats it, plus a
//! little deterministic sensor noise.

use super::{CameraConfig, RawFrame};
use crate::timing::TICKS_PER_MILLISECOND;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use thiserror::Error;

/// PAL frame interval.
const PAL_FRAME_TICKS: i64 = 40 * TICKS_PER_MILLISECOND;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The configuration was rejected.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// `capture` was called before `open`.
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for frame sources.
///
/// This abstraction allows swapping between a capture driver and the
/// synthetic source used for testing.
pub trait FrameSource {
    /// Opens and initializes the source with the given configuration.
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Captures a single frame.
    fn capture(&mut self) -> Result<RawFrame, CameraError>;

    /// Checks if the source is currently open.
    fn is_open(&self) -> bool;

    /// Closes the source and releases resources.
    fn close(&mut self);
}

/// Mock integrating camera that generates synthetic frames.
#[derive(Debug)]
pub struct MockCamera {
    config: Option<CameraConfig>,
    sequence: u64,
    start_ticks: i64,
    frame_ticks: i64,
    /// Video frames per exposure.
    integration_rate: u32,
    /// Peak noise amplitude added to each sample.
    noise: u8,
    rng: ChaCha8Rng,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MockCamera {
    /// Creates a camera integrating `integration_rate` frames per exposure.
    pub fn new(integration_rate: u32) -> Self {
        Self {
            config: None,
            sequence: 0,
            start_ticks: crate::timing::now_ticks(),
            frame_ticks: PAL_FRAME_TICKS,
            integration_rate: integration_rate.max(1),
            noise: 2,
            rng: ChaCha8Rng::seed_from_u64(0x5eed),
        }
    }

    /// Sets the tick value of the first captured frame.
    pub fn with_start_ticks(mut self, ticks: i64) -> Self {
        self.start_ticks = ticks;
        self
    }

    /// Sets the peak noise amplitude.
    pub fn with_noise(mut self, noise: u8) -> Self {
        self.noise = noise;
        self
    }

    /// Re-seeds the noise generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Brightness of the exposure containing frame `sequence`.
    fn exposure_level(&self, sequence: u64) -> u8 {
        let exposure = sequence / u64::from(self.integration_rate);
        // Alternate well separated levels so every exposure boundary shows.
        if exposure % 2 == 0 {
            60
        } else {
            180
        }
    }
}

impl FrameSource for MockCamera {
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!(
            width = config.width,
            height = config.height,
            integration_rate = self.integration_rate,
            "MockCamera opened"
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, CameraError> {
        let (width, height, len) = {
            let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
            (config.width, config.height, config.source_len())
        };

        let level = self.exposure_level(self.sequence);
        let span = u32::from(self.noise) * 2 + 1;
        let mut pixels = Vec::with_capacity(len);
        for _ in 0..len {
            let jitter = (self.rng.next_u32() % span) as i32 - i32::from(self.noise);
            pixels.push((i32::from(level) + jitter).clamp(0, 255) as u8);
        }

        let ticks = self.start_ticks + self.sequence as i64 * self.frame_ticks;
        self.sequence += 1;
        Ok(RawFrame::new(pixels, width, height, ticks, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("MockCamera closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new(4);
        let config = CameraConfig::with_dimensions(64, 48);

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);
        assert_eq!(frame2.ticks() - frame.ticks(), PAL_FRAME_TICKS);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::default();
        assert!(matches!(camera.capture(), Err(CameraError::NotInitialized)));
    }

    #[test]
    fn test_level_changes_once_per_exposure() {
        let mut camera = MockCamera::new(2).with_noise(0);
        camera.open(&CameraConfig::with_dimensions(8, 8)).unwrap();

        let levels: Vec<u8> = (0..6)
            .map(|_| camera.capture().unwrap().pixels()[0])
            .collect();
        assert_eq!(levels, vec![60, 60, 180, 180, 60, 60]);
    }

    #[test]
    fn test_seed_makes_noise_repeatable() {
        let config = CameraConfig::with_dimensions(16, 16);
        let capture = |seed| {
            let mut camera = MockCamera::new(1).with_start_ticks(0).with_seed(seed);
            camera.open(&config).unwrap();
            camera.capture().unwrap().pixels().to_vec()
        };

        assert_eq!(capture(7), capture(7));
        assert_ne!(capture(7), capture(8));
    }
}
