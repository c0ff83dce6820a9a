//! Raw video frame as delivered by the capture driver.

/// A single decoded video frame.
///
/// Pixels are 24-bit BGR with scanlines stored bottom-to-top, the layout
/// DIB-based capture drivers hand over.
#[derive(Clone)]
pub struct RawFrame {
    /// Raw pixel data, `3 * width * height` bytes.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Capture timestamp in 100ns ticks.
    ticks: i64,
    /// Monotonic sequence number.
    sequence: u64,
}

impl RawFrame {
    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, ticks: i64, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            ticks,
            sequence,
        }
    }

    /// Creates a frame where every channel of every pixel has `value`.
    pub fn uniform(width: u32, height: u32, value: u8, ticks: i64, sequence: u64) -> Self {
        let len = 3 * (width as usize) * (height as usize);
        Self::new(vec![value; len], width, height, ticks, sequence)
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == 3 * (self.width as usize) * (self.height as usize)
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("ticks", &self.ticks)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = RawFrame::uniform(640, 480, 7, 1_000, 1);

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.ticks(), 1_000);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = RawFrame::new(vec![0u8; 100], 640, 480, 0, 1);
        assert!(!frame.is_valid());
    }
}
