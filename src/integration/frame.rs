//! Integrated frame and status types.

use serde::{Deserialize, Serialize};

/// A completed integration period, averaged down to 8-bit mono pixels.
///
/// Immutable once produced. Ownership moves from the accumulator through
/// the recording queue to the writer, which drops it after writing.
pub struct IntegratedFrame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Video frames accumulated into this one.
    pub frame_count: u32,
    /// First source frame number of the period.
    pub start_frame: u64,
    /// Last source frame number of the period.
    pub end_frame: u64,
    /// Capture ticks of the first source frame.
    pub start_ticks: i64,
    /// Capture ticks of the last source frame.
    pub end_ticks: i64,
    /// Sequential integrated frame number.
    pub frame_number: u64,
}

impl IntegratedFrame {
    pub(crate) fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            frame_count: 0,
            start_frame: 0,
            end_frame: 0,
            start_ticks: 0,
            end_ticks: 0,
            frame_number: 0,
        }
    }

    /// Returns the mono pixels, top row first.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Mid-exposure capture ticks.
    pub fn mid_ticks(&self) -> i64 {
        self.start_ticks + (self.end_ticks - self.start_ticks) / 2
    }
}

impl std::fmt::Debug for IntegratedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegratedFrame")
            .field("frame_number", &self.frame_number)
            .field("frame_count", &self.frame_count)
            .field("start_frame", &self.start_frame)
            .field("end_frame", &self.end_frame)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

/// Snapshot of the last confirmed integration period, for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStatus {
    /// Video frames in the period.
    pub counted_frames: u32,
    /// Camera frame number that opened the period.
    pub start_exposure_frame_no: u64,
    /// Camera frame number that closed the period.
    pub end_exposure_frame_no: u64,
    /// Capture ticks of the first frame.
    pub start_exposure_ticks: i64,
    /// Capture ticks of the last frame.
    pub end_exposure_ticks: i64,
    /// Number of the integrated frame the period produced.
    pub integrated_frame_no: u64,
    /// Cut-off ratio in effect when the period closed.
    pub cutoff_ratio: f32,
    /// Increments on every produced frame, confirmed or not.
    pub unique_frame_no: u64,
}

/// Per-frame telemetry returned by frame processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameProcessingStatus {
    /// Camera frames seen since configuration.
    pub camera_frame_no: u64,
    /// Number of the integrated frame being built.
    pub integrated_frame_no: u64,
    /// Frames accumulated in the current period.
    pub integrated_frames_so_far: u32,
    /// Diff signature of this frame.
    pub frame_diff_signature: f32,
    /// Signature distance over the boundary threshold.
    pub current_signature_ratio: f32,
}
