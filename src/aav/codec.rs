//! Pixel payload compression.
//!
//! LZ4 was chosen for the compressed layouts because analogue video frames
//! are mostly sky background, and differential frames are mostly zeros,
//! which LZ4 handles at capture rate.

use serde::{Deserialize, Serialize};

use super::AavError;

/// Compression scheme of an image layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    /// Stored as-is.
    Uncompressed,
    /// LZ4 block with the decoded size prepended.
    Lz4,
}

impl Compression {
    /// Name stored in the layout definition.
    pub fn name(self) -> &'static str {
        match self {
            Self::Uncompressed => "UNCOMPRESSED",
            Self::Lz4 => "LZ4",
        }
    }

    /// Parses a stored compression name.
    pub fn from_name(name: &str) -> Result<Self, AavError> {
        match name {
            "UNCOMPRESSED" => Ok(Self::Uncompressed),
            "LZ4" => Ok(Self::Lz4),
            other => Err(AavError::Corrupt(format!("unknown compression {other:?}"))),
        }
    }

    /// Compresses `data` into a layout payload.
    pub fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Uncompressed => data.to_vec(),
            Self::Lz4 => lz4_flex::compress_prepend_size(data),
        }
    }

    /// Reverses [`Compression::compress`].
    pub fn decompress(self, payload: &[u8]) -> Result<Vec<u8>, AavError> {
        match self {
            Self::Uncompressed => Ok(payload.to_vec()),
            Self::Lz4 => lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| AavError::Decompress(e.to_string())),
        }
    }
}

/// Byte-wise difference of `current` against `previous`, modulo 256.
pub(crate) fn delta_encode(current: &[u8], previous: &[u8]) -> Vec<u8> {
    current
        .iter()
        .zip(previous)
        .map(|(&c, &p)| c.wrapping_sub(p))
        .collect()
}

/// Inverse of [`delta_encode`].
pub(crate) fn delta_decode(delta: &[u8], previous: &[u8]) -> Vec<u8> {
    delta
        .iter()
        .zip(previous)
        .map(|(&d, &p)| d.wrapping_add(p))
        .collect()
}

/// Ratio of raw to stored size, for logging.
pub fn compression_ratio(raw_len: usize, stored_len: usize) -> f64 {
    if raw_len == 0 || stored_len == 0 {
        return 1.0;
    }
    raw_len as f64 / stored_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_shrinks_flat_frame() {
        let frame = vec![12u8; 720 * 576];
        let stored = Compression::Lz4.compress(&frame);

        assert!(compression_ratio(frame.len(), stored.len()) > 10.0);
        assert_eq!(Compression::Lz4.decompress(&stored).unwrap(), frame);
    }

    #[test]
    fn test_corrupt_lz4_payload_rejected() {
        let data: Vec<u8> = (0..200).collect();
        let mut stored = Compression::Lz4.compress(&data);
        stored.truncate(stored.len() / 2);

        let result = Compression::Lz4.decompress(&stored);
        assert!(matches!(result, Err(AavError::Decompress(_))));
    }

    #[test]
    fn test_delta_wraps() {
        let previous = [250u8, 3, 100];
        let current = [4u8, 250, 100];
        let delta = delta_encode(&current, &previous);

        assert_eq!(delta[2], 0);
        assert_eq!(delta_decode(&delta, &previous), current);
    }

    #[test]
    fn test_names_round_trip() {
        for c in [Compression::Uncompressed, Compression::Lz4] {
            assert_eq!(Compression::from_name(c.name()).unwrap(), c);
        }
        assert!(Compression::from_name("QUICKLZ").is_err());
    }
}
