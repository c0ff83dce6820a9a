//! Pixel accumulation over an integration period.
//!
//! Every captured frame is reduced to mono and added into a running sum.
//! When the signature tracker reports a new period, or on every frame
//! while integration is unlocked, the sum is flushed into an 8-bit
//! integrated frame and the latest preview image.

use serde::{Deserialize, Serialize};

use super::frame::{FrameProcessingStatus, ImageStatus, IntegratedFrame};
use crate::analysis::{DiffSignature, IntegrationThresholds, SignatureTracker};
use crate::capture::CameraConfig;

/// Reduction of a 24-bit BGR pixel to a single mono channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonochromeMode {
    /// Red channel only.
    #[default]
    R,
    /// Green channel only.
    G,
    /// Blue channel only.
    B,
    /// `0.299R + 0.587G + 0.114B`
    Luma,
}

impl MonochromeMode {
    /// Reduces one BGR pixel.
    #[inline]
    fn reduce(self, bgr: &[u8]) -> f64 {
        match self {
            Self::R => f64::from(bgr[2]),
            Self::G => f64::from(bgr[1]),
            Self::B => f64::from(bgr[0]),
            Self::Luma => {
                let luma =
                    0.299 * f64::from(bgr[2]) + 0.587 * f64::from(bgr[1]) + 0.114 * f64::from(bgr[0]);
                luma.clamp(0.0, 255.0).floor()
            }
        }
    }

    /// Name written to the AAV image section.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::R => "R",
            Self::G => "G",
            Self::B => "B",
            Self::Luma => "LUMA",
        }
    }
}

/// Result of adding one captured frame.
#[derive(Debug)]
pub struct FrameOutcome {
    /// Telemetry for the captured frame.
    pub status: FrameProcessingStatus,
    /// Frame flushed by this call, if any.
    pub frame: Option<IntegratedFrame>,
}

/// Owns the running pixel sums of the current integration period.
pub struct FrameAccumulator {
    width: u32,
    height: u32,
    mono_mode: MonochromeMode,
    signature: DiffSignature,
    tracker: SignatureTracker,
    sums: Vec<f64>,
    preview: Vec<u8>,
    locked: bool,
    frames_in_period: u32,
    frame_no: u64,
    first_frame: u64,
    last_frame: u64,
    first_ticks: i64,
    last_ticks: i64,
    integrated_frame_no: u64,
    status: ImageStatus,
    confirmed: ImageStatus,
}

impl FrameAccumulator {
    /// Creates an accumulator with zeroed buffers sized for `config`.
    pub fn new(config: &CameraConfig) -> Self {
        let pixels = config.pixel_count();
        Self {
            width: config.width,
            height: config.height,
            mono_mode: config.mono_mode,
            signature: DiffSignature::new(config.width, config.height),
            tracker: SignatureTracker::new(IntegrationThresholds {
                is_integrating: config.is_integrating,
                difference_factor: config.signature_difference_factor,
                minimum_difference: config.minimum_signature_difference,
            }),
            sums: vec![0.0; pixels],
            preview: vec![0; pixels],
            locked: false,
            frames_in_period: 0,
            frame_no: 0,
            first_frame: 0,
            last_frame: 0,
            first_ticks: 0,
            last_ticks: 0,
            integrated_frame_no: 0,
            status: ImageStatus::default(),
            confirmed: ImageStatus::default(),
        }
    }

    /// Adds a 24-bit bottom-up source frame captured at `ticks`.
    ///
    /// The buffer must hold `3 * width * height` bytes.
    pub fn add_frame(&mut self, source: &[u8], ticks: i64) -> FrameOutcome {
        debug_assert_eq!(source.len(), 3 * self.sums.len());

        let signature = self.signature.calculate(source);
        self.frame_no += 1;

        let is_new_period = self.tracker.evaluate(signature);
        let mut frame = None;

        if is_new_period || !self.locked {
            frame = self.flush(is_new_period);
            self.sums.fill(0.0);

            if is_new_period {
                self.frames_in_period = 0;
                self.last_frame = 0;
                self.last_ticks = 0;
            }
        }

        // Also covers the first period after configuration, which starts
        // without a detected boundary.
        if self.frames_in_period == 0 {
            self.first_frame = self.frame_no;
            self.first_ticks = ticks;
        }

        self.accumulate(source);
        self.frames_in_period += 1;
        self.last_frame = self.frame_no;
        self.last_ticks = ticks;

        FrameOutcome {
            status: FrameProcessingStatus {
                camera_frame_no: self.frame_no,
                integrated_frame_no: self.integrated_frame_no,
                integrated_frames_so_far: self.frames_in_period,
                frame_diff_signature: signature,
                current_signature_ratio: self.tracker.current_ratio(),
            },
            frame,
        }
    }

    /// Adds the mono reduction of `source` into the sums, top row first.
    fn accumulate(&mut self, source: &[u8]) {
        let width = self.width as usize;
        let height = self.height as usize;
        let stride = 3 * width;
        let mode = self.mono_mode;

        for (y, row) in self.sums.chunks_exact_mut(width).enumerate() {
            let line = (height - 1 - y) * stride;
            let scanline = &source[line..line + stride];
            for (sum, bgr) in row.iter_mut().zip(scanline.chunks_exact(3)) {
                *sum += mode.reduce(bgr);
            }
        }
    }

    /// Turns the current sums into the preview and an integrated frame.
    fn flush(&mut self, is_new_period: bool) -> Option<IntegratedFrame> {
        self.integrated_frame_no += 1;

        if self.frames_in_period == 0 {
            self.preview.fill(0);
            return None;
        }

        let divisor = if self.locked {
            f64::from(self.frames_in_period)
        } else {
            1.0
        };

        let mut pixels = vec![0u8; self.sums.len()];
        for ((sum, shown), out) in self
            .sums
            .iter()
            .zip(self.preview.iter_mut())
            .zip(pixels.iter_mut())
        {
            let value = clamp_to_byte(sum / divisor);
            *shown = value;
            *out = value;
        }

        if self.locked || is_new_period {
            self.confirmed = ImageStatus {
                counted_frames: self.frames_in_period,
                start_exposure_frame_no: self.first_frame,
                end_exposure_frame_no: self.last_frame,
                start_exposure_ticks: self.first_ticks,
                end_exposure_ticks: self.last_ticks,
                integrated_frame_no: self.integrated_frame_no,
                cutoff_ratio: self.tracker.cutoff_ratio(),
                unique_frame_no: 0,
            };
            tracing::trace!(
                integrated_frame_no = self.integrated_frame_no,
                counted_frames = self.frames_in_period,
                cutoff_ratio = self.confirmed.cutoff_ratio,
                "Integration period confirmed"
            );
        }

        self.status = ImageStatus {
            unique_frame_no: self.status.unique_frame_no + 1,
            ..self.confirmed
        };

        let mut frame = IntegratedFrame::new(pixels, self.width, self.height);
        frame.frame_count = self.frames_in_period;
        frame.start_frame = self.first_frame;
        frame.end_frame = self.last_frame;
        frame.start_ticks = self.first_ticks;
        frame.end_ticks = self.last_ticks;
        frame.frame_number = self.integrated_frame_no;
        Some(frame)
    }

    /// Locks or unlocks integration.
    ///
    /// While locked, frames accumulate until the next detected boundary
    /// and flushes average over the accumulated frame count.
    pub fn lock_integration(&mut self, lock: bool) {
        if self.locked != lock {
            tracing::info!(locked = lock, "Integration lock changed");
        }
        self.locked = lock;
    }

    /// Returns true if integration is locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Latest flushed mono image, top row first.
    pub fn preview(&self) -> &[u8] {
        &self.preview
    }

    /// Latest preview with the display flips applied.
    pub fn oriented_preview(&self, flip_horizontal: bool, flip_vertical: bool) -> Vec<u8> {
        let width = self.width as usize;
        let mut rows: Vec<&[u8]> = self.preview.chunks_exact(width).collect();
        if flip_vertical {
            rows.reverse();
        }

        let mut out = Vec::with_capacity(self.preview.len());
        for row in rows {
            if flip_horizontal {
                out.extend(row.iter().rev());
            } else {
                out.extend_from_slice(row);
            }
        }
        out
    }

    /// Status of the last confirmed integration period.
    pub fn image_status(&self) -> ImageStatus {
        self.status
    }

    /// Source frames seen since configuration.
    pub fn frame_no(&self) -> u64 {
        self.frame_no
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Truncates toward zero and clamps into the 8-bit range.
#[inline]
fn clamp_to_byte(value: f64) -> u8 {
    let value = value as i64;
    if value <= 0 {
        0
    } else if value >= 255 {
        255
    } else {
        value as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(is_integrating: bool) -> CameraConfig {
        CameraConfig {
            width: 4,
            height: 4,
            mono_mode: MonochromeMode::R,
            is_integrating,
            signature_difference_factor: 3.0,
            minimum_signature_difference: 1.0,
            ..Default::default()
        }
    }

    fn uniform(value: u8) -> Vec<u8> {
        vec![value; 3 * 16]
    }

    #[test]
    fn test_locked_integration_averages() {
        let mut acc = FrameAccumulator::new(&config(true));
        acc.lock_integration(true);

        assert!(acc.add_frame(&uniform(10), 0).frame.is_none());
        assert!(acc.add_frame(&uniform(20), 1).frame.is_none());

        // Flat signature after a change of 5 starts a new period.
        let frame = acc.add_frame(&uniform(20), 2).frame.unwrap();
        assert_eq!(frame.frame_count, 2);
        assert!(frame.pixels().iter().all(|&p| p == 15));
        assert!(acc.preview().iter().all(|&p| p == 15));
    }

    #[test]
    fn test_unlocked_reports_latest_frame_only() {
        let mut acc = FrameAccumulator::new(&config(true));

        acc.add_frame(&uniform(10), 0);
        let second = acc.add_frame(&uniform(20), 1).frame.unwrap();
        assert!(second.pixels().iter().all(|&p| p == 10));

        let third = acc.add_frame(&uniform(20), 2).frame.unwrap();
        assert!(third.pixels().iter().all(|&p| p == 20));
        assert!(acc.preview().iter().all(|&p| p == 20));
    }

    #[test]
    fn test_first_flush_zero_fills_preview() {
        let mut acc = FrameAccumulator::new(&config(false));
        acc.preview.fill(99);

        let outcome = acc.add_frame(&uniform(50), 0);
        assert!(outcome.frame.is_none());
        assert!(acc.preview().iter().all(|&p| p == 0));
        assert_eq!(outcome.status.integrated_frame_no, 1);
        assert_eq!(outcome.status.integrated_frames_so_far, 1);
    }

    #[test]
    fn test_clamps_out_of_range_averages() {
        let mut acc = FrameAccumulator::new(&config(false));
        acc.frames_in_period = 1;

        acc.sums.fill(-5.0);
        let low = acc.flush(true).unwrap();
        assert!(low.pixels().iter().all(|&p| p == 0));
        assert!(acc.preview().iter().all(|&p| p == 0));

        acc.sums.fill(300.0);
        let high = acc.flush(true).unwrap();
        assert!(high.pixels().iter().all(|&p| p == 255));
        assert!(acc.preview().iter().all(|&p| p == 255));
    }

    #[test]
    fn test_rows_read_bottom_up() {
        let mut acc = FrameAccumulator::new(&config(false));

        // Last source scanline is the top display row.
        let mut source = uniform(0);
        let stride = 3 * 4;
        for b in &mut source[3 * stride..] {
            *b = 77;
        }
        acc.add_frame(&source, 0);
        let frame = acc.add_frame(&uniform(0), 1).frame.unwrap();

        assert!(frame.pixels()[..4].iter().all(|&p| p == 77));
        assert!(frame.pixels()[4..].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_mono_modes() {
        let bgr = [30u8, 60, 90];
        assert_eq!(MonochromeMode::R.reduce(&bgr), 90.0);
        assert_eq!(MonochromeMode::G.reduce(&bgr), 60.0);
        assert_eq!(MonochromeMode::B.reduce(&bgr), 30.0);
        // 0.299 * 90 + 0.587 * 60 + 0.114 * 30 = 65.55
        assert_eq!(MonochromeMode::Luma.reduce(&bgr), 65.0);
        assert_eq!(MonochromeMode::Luma.reduce(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn test_non_integrating_frame_metadata() {
        let mut acc = FrameAccumulator::new(&config(false));
        acc.add_frame(&uniform(1), 100);
        acc.add_frame(&uniform(2), 200);
        let frame = acc.add_frame(&uniform(3), 300).frame.unwrap();

        assert_eq!(frame.frame_count, 1);
        assert_eq!(frame.start_frame, 2);
        assert_eq!(frame.end_frame, 2);
        assert_eq!(frame.start_ticks, 200);
        assert_eq!(frame.end_ticks, 200);
        assert_eq!(frame.frame_number, 3);

        let status = acc.image_status();
        assert_eq!(status.counted_frames, 1);
        assert_eq!(status.start_exposure_frame_no, 2);
        assert_eq!(status.end_exposure_ticks, 200);
        assert_eq!(status.unique_frame_no, 2);
    }

    #[test]
    fn test_unconfirmed_flush_echoes_confirmed_status() {
        let mut acc = FrameAccumulator::new(&config(true));
        acc.add_frame(&uniform(10), 0);
        acc.add_frame(&uniform(20), 1);
        // Boundary: confirms the period of frames 1..2.
        acc.add_frame(&uniform(20), 2);
        let confirmed = acc.image_status();
        assert_eq!(confirmed.counted_frames, 2);
        assert_eq!(confirmed.start_exposure_frame_no, 1);
        assert_eq!(confirmed.end_exposure_frame_no, 2);

        // Unlocked, no boundary: only the unique counter moves.
        acc.add_frame(&uniform(20), 3);
        let echoed = acc.image_status();
        assert_eq!(
            ImageStatus {
                unique_frame_no: confirmed.unique_frame_no,
                ..echoed
            },
            confirmed
        );
        assert_eq!(echoed.unique_frame_no, confirmed.unique_frame_no + 1);
    }

    #[test]
    fn test_oriented_preview_flips() {
        let mut acc = FrameAccumulator::new(&CameraConfig {
            width: 2,
            height: 2,
            ..config(false)
        });
        acc.preview.copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(acc.oriented_preview(false, false), vec![1, 2, 3, 4]);
        assert_eq!(acc.oriented_preview(true, false), vec![2, 1, 4, 3]);
        assert_eq!(acc.oriented_preview(false, true), vec![3, 4, 1, 2]);
        assert_eq!(acc.oriented_preview(true, true), vec![4, 3, 2, 1]);
    }
}
