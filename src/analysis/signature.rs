//! Frame-to-frame difference signature.
//!
//! A fixed window near the frame centre is sampled from every frame and
//! compared with the same window of the previous frame. The mean absolute
//! difference is a cheap scalar that jumps when the camera starts a new
//! exposure and stays flat while it repeats the same one.

/// Side of the square sampling window, in pixels.
pub const SIGNATURE_WINDOW: u32 = 32;

/// Computes difference signatures over a centred sampling window.
pub struct DiffSignature {
    width: usize,
    height: usize,
    window_width: usize,
    window_height: usize,
    /// First sampled source scanline.
    row: usize,
    /// First sampled column.
    col: usize,
    previous: Vec<u8>,
    current: Vec<u8>,
    calculated: u64,
}

impl DiffSignature {
    /// Creates a calculator for frames of the given size.
    ///
    /// The window is clamped to the frame so small frames sample all of it.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width as usize;
        let height = height as usize;
        let window_width = width.min(SIGNATURE_WINDOW as usize);
        let window_height = height.min(SIGNATURE_WINDOW as usize);
        let row = (height / 2).saturating_sub(1).min(height - window_height);
        let col = (width / 2).min(width - window_width);
        let samples = window_width * window_height;

        Self {
            width,
            height,
            window_width,
            window_height,
            row,
            col,
            previous: vec![0; samples],
            current: vec![0; samples],
            calculated: 0,
        }
    }

    /// Computes the signature of a 24-bit source frame.
    ///
    /// Only the first byte of each pixel is sampled. The very first frame
    /// is compared against a zeroed window.
    pub fn calculate(&mut self, source: &[u8]) -> f32 {
        debug_assert_eq!(source.len(), 3 * self.width * self.height);
        let stride = 3 * self.width;

        let mut sum = 0f32;
        let mut i = 0;
        for y in 0..self.window_height {
            let line = (self.row + y) * stride + 3 * self.col;
            for x in 0..self.window_width {
                let value = source[line + 3 * x];
                self.current[i] = value;
                sum += (f32::from(value) - f32::from(self.previous[i])).abs() / 2.0;
                i += 1;
            }
        }

        std::mem::swap(&mut self.previous, &mut self.current);
        self.calculated += 1;

        sum / (self.window_width * self.window_height) as f32
    }

    /// Number of signatures computed so far.
    pub fn calculated(&self) -> u64 {
        self.calculated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: usize, height: usize, value: u8) -> Vec<u8> {
        vec![value; 3 * width * height]
    }

    #[test]
    fn test_first_frame_compares_against_zero() {
        let mut sig = DiffSignature::new(64, 64);
        assert_eq!(sig.calculate(&uniform(64, 64, 100)), 50.0);
    }

    #[test]
    fn test_identical_frames_zero_signature() {
        let mut sig = DiffSignature::new(64, 64);
        sig.calculate(&uniform(64, 64, 100));
        assert_eq!(sig.calculate(&uniform(64, 64, 100)), 0.0);
        assert_eq!(sig.calculated(), 2);
    }

    #[test]
    fn test_small_frame_window_clamped() {
        let mut sig = DiffSignature::new(4, 4);
        sig.calculate(&uniform(4, 4, 10));
        assert_eq!(sig.calculate(&uniform(4, 4, 30)), 10.0);
    }

    #[test]
    fn test_only_window_is_sampled() {
        let mut sig = DiffSignature::new(128, 128);
        let base = uniform(128, 128, 40);
        sig.calculate(&base);

        // Change the first scanline only; it lies outside the window.
        let mut changed = base.clone();
        changed[..3 * 128].fill(200);
        assert_eq!(sig.calculate(&changed), 0.0);
    }
}
