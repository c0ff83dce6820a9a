//! Image section: frame geometry and the pixel layouts frames may use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::str::FromStr;

use super::codec::{delta_decode, delta_encode, Compression};
use super::wire::*;
use super::AavError;

/// Layout type of a full frame stored as-is.
pub const LAYOUT_FULL_IMAGE_RAW: &str = "FULL-IMAGE-RAW";
/// Layout type of a full frame stored as a difference from a base frame.
pub const LAYOUT_FULL_IMAGE_DIFFERENTIAL: &str = "FULL-IMAGE-DIFFERENTIAL-CODING";
/// Differential base: the previous frame written with the same layout.
pub const DIFF_BASE_PREVIOUS_FRAME: &str = "PREV-FRAME";

/// Byte mode of a payload that decodes on its own.
pub const BYTE_MODE_KEY_FRAME: u8 = 0;
/// Byte mode of a payload holding a difference from the previous frame.
pub const BYTE_MODE_DIFF: u8 = 1;

/// A named pixel encoding frames can be written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLayout {
    /// Id frames refer to when they use this layout.
    pub id: u8,
    /// Layout type, e.g. `FULL-IMAGE-RAW`.
    pub layout_type: String,
    /// Compression of the payload.
    pub compression: Compression,
    /// Bits per pixel.
    pub bpp: u8,
    /// Frames between key frames of a differential layout, 0 otherwise.
    pub key_frame_interval: u32,
    /// Base frame of a differential layout.
    pub diff_base: Option<String>,
}

impl ImageLayout {
    /// Plain full-frame layout.
    pub fn raw(id: u8, compression: Compression) -> Self {
        Self {
            id,
            layout_type: LAYOUT_FULL_IMAGE_RAW.to_string(),
            compression,
            bpp: 8,
            key_frame_interval: 0,
            diff_base: None,
        }
    }

    /// Differential layout keyed every `key_frame_interval` frames.
    pub fn differential(id: u8, compression: Compression, key_frame_interval: u32) -> Self {
        Self {
            id,
            layout_type: LAYOUT_FULL_IMAGE_DIFFERENTIAL.to_string(),
            compression,
            bpp: 8,
            key_frame_interval,
            diff_base: Some(DIFF_BASE_PREVIOUS_FRAME.to_string()),
        }
    }

    /// True for layouts that store differences from a base frame.
    pub fn is_differential(&self) -> bool {
        self.diff_base.is_some()
    }

    fn write(&self, buf: &mut Vec<u8>) {
        put_u8(buf, self.id);
        put_str(buf, &self.layout_type);
        put_str(buf, self.compression.name());
        put_u8(buf, self.bpp);
        put_u32(buf, self.key_frame_interval);
        put_str(buf, self.diff_base.as_deref().unwrap_or(""));
    }

    fn read(r: &mut impl Read) -> Result<Self, AavError> {
        let id = read_u8(r)?;
        let layout_type = read_str(r)?;
        let compression = Compression::from_name(&read_str(r)?)?;
        let bpp = read_u8(r)?;
        let key_frame_interval = read_u32(r)?;
        let diff_base = Some(read_str(r)?).filter(|s| !s.is_empty());
        Ok(Self {
            id,
            layout_type,
            compression,
            bpp,
            key_frame_interval,
            diff_base,
        })
    }
}

/// Standard layout ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageLayoutChoice {
    /// Layout 1, uncompressed.
    Raw,
    /// Layout 2, LZ4 compressed difference from the previous frame.
    #[default]
    Differential,
    /// Layout 3, LZ4 compressed.
    Compressed,
}

impl ImageLayoutChoice {
    /// Id of the matching standard layout.
    pub fn layout_id(self) -> u8 {
        match self {
            Self::Raw => 1,
            Self::Differential => 2,
            Self::Compressed => 3,
        }
    }
}

impl FromStr for ImageLayoutChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "differential" => Ok(Self::Differential),
            "compressed" => Ok(Self::Compressed),
            other => Err(format!(
                "unknown image layout {other:?} (expected raw, differential or compressed)"
            )),
        }
    }
}

/// The three layouts every recording defines.
pub fn standard_layouts(key_frame_interval: u32) -> Vec<ImageLayout> {
    vec![
        ImageLayout::raw(1, Compression::Uncompressed),
        ImageLayout::differential(2, Compression::Lz4, key_frame_interval),
        ImageLayout::raw(3, Compression::Lz4),
    ]
}

/// An encoded frame image.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Layout the payload was encoded with.
    pub layout_id: u8,
    /// [`BYTE_MODE_KEY_FRAME`] or [`BYTE_MODE_DIFF`].
    pub byte_mode: u8,
    /// Compressed pixel data.
    pub payload: Vec<u8>,
}

/// Differential chain state of one layout.
#[derive(Debug, Clone, Default)]
struct ChainState {
    previous: Option<Vec<u8>>,
    since_key_frame: u32,
}

/// Chain state produced by [`ImageSection::encode`], applied with
/// [`ImageSection::commit`] once its frame is on disk.
#[derive(Debug, Clone)]
pub struct ChainUpdate {
    layout_id: u8,
    next: Option<ChainState>,
}

/// Frame geometry plus the layouts and tags of the image section.
pub struct ImageSection {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bits per pixel; always 8.
    pub bpp: u8,
    layouts: BTreeMap<u8, ImageLayout>,
    tags: Vec<(String, String)>,
    chains: BTreeMap<u8, ChainState>,
}

impl ImageSection {
    /// Creates an empty section. Only 8 bits per pixel is supported.
    pub fn new(width: u32, height: u32, bpp: u8) -> Result<Self, AavError> {
        if bpp != 8 {
            return Err(AavError::UnsupportedBitDepth(bpp));
        }
        Ok(Self {
            width,
            height,
            bpp,
            layouts: BTreeMap::new(),
            tags: Vec::new(),
            chains: BTreeMap::new(),
        })
    }

    /// Adds or replaces a layout definition.
    pub fn add_layout(&mut self, layout: ImageLayout) -> Result<(), AavError> {
        if layout.bpp != 8 {
            return Err(AavError::UnsupportedBitDepth(layout.bpp));
        }
        self.chains.insert(layout.id, ChainState::default());
        self.layouts.insert(layout.id, layout);
        Ok(())
    }

    /// Adds a tag, replacing the value of an existing one.
    pub fn add_or_update_tag(&mut self, key: &str, value: &str) {
        match self.tags.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.tags.push((key.to_string(), value.to_string())),
        }
    }

    /// Looks up a layout by id.
    pub fn layout(&self, id: u8) -> Option<&ImageLayout> {
        self.layouts.get(&id)
    }

    /// Layouts in id order.
    pub fn layouts(&self) -> impl Iterator<Item = &ImageLayout> {
        self.layouts.values()
    }

    /// Image section tags.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Bytes in one decoded frame.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Encodes `pixels` with the given layout.
    ///
    /// The layout's differential chain is left untouched; the returned
    /// [`ChainUpdate`] advances it once the frame is actually written.
    pub fn encode(
        &self,
        layout_id: u8,
        pixels: &[u8],
    ) -> Result<(EncodedImage, ChainUpdate), AavError> {
        let layout = self
            .layouts
            .get(&layout_id)
            .ok_or(AavError::UnknownLayout(layout_id))?;
        if pixels.len() != self.pixel_count() {
            return Err(AavError::InvalidImageSize {
                expected: self.pixel_count(),
                actual: pixels.len(),
            });
        }

        let chain = self.chains.get(&layout_id);
        let previous = chain.and_then(|c| c.previous.as_deref());
        let since_key_frame = chain.map_or(0, |c| c.since_key_frame);
        let base = previous.filter(|_| {
            layout.is_differential()
                && (layout.key_frame_interval == 0 || since_key_frame < layout.key_frame_interval)
        });

        let (byte_mode, data, since_key_frame) = match base {
            Some(previous) => (BYTE_MODE_DIFF, delta_encode(pixels, previous), since_key_frame),
            None => (BYTE_MODE_KEY_FRAME, pixels.to_vec(), 0),
        };
        let next = layout.is_differential().then(|| ChainState {
            previous: Some(pixels.to_vec()),
            since_key_frame: since_key_frame + 1,
        });

        let image = EncodedImage {
            layout_id,
            byte_mode,
            payload: layout.compression.compress(&data),
        };
        Ok((image, ChainUpdate { layout_id, next }))
    }

    /// Advances a layout's differential chain past a written frame.
    pub fn commit(&mut self, update: ChainUpdate) {
        if let Some(next) = update.next {
            self.chains.insert(update.layout_id, next);
        }
    }

    /// Decodes a payload. Differential payloads need the previous decoded
    /// frame of the same layout.
    pub fn decode(
        &self,
        image: &EncodedImage,
        previous: Option<&[u8]>,
    ) -> Result<Vec<u8>, AavError> {
        let layout = self
            .layouts
            .get(&image.layout_id)
            .ok_or(AavError::UnknownLayout(image.layout_id))?;
        let data = layout.compression.decompress(&image.payload)?;
        if data.len() != self.pixel_count() {
            return Err(AavError::Corrupt(format!(
                "image payload decodes to {} bytes, expected {}",
                data.len(),
                self.pixel_count()
            )));
        }

        match image.byte_mode {
            BYTE_MODE_KEY_FRAME => Ok(data),
            BYTE_MODE_DIFF => {
                let previous = previous.ok_or_else(|| {
                    AavError::Corrupt("differential frame without a base frame".to_string())
                })?;
                Ok(delta_decode(&data, previous))
            }
            other => Err(AavError::Corrupt(format!("unknown byte mode {other}"))),
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        put_u32(buf, self.width);
        put_u32(buf, self.height);
        put_u8(buf, self.bpp);
        put_u8(buf, self.layouts.len() as u8);
        for layout in self.layouts.values() {
            layout.write(buf);
        }
        put_tags(buf, &self.tags);
    }

    pub(crate) fn read(r: &mut impl Read) -> Result<Self, AavError> {
        let width = read_u32(r)?;
        let height = read_u32(r)?;
        let bpp = read_u8(r)?;
        let mut section = Self::new(width, height, bpp)?;
        let count = read_u8(r)?;
        for _ in 0..count {
            section.add_layout(ImageLayout::read(r)?)?;
        }
        section.tags = read_tags(r)?;
        Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(key_frame_interval: u32) -> ImageSection {
        let mut section = ImageSection::new(4, 2, 8).unwrap();
        for layout in standard_layouts(key_frame_interval) {
            section.add_layout(layout).unwrap();
        }
        section
    }

    /// Encodes and commits, as a writer does for every finished frame.
    fn write(section: &mut ImageSection, layout_id: u8, pixels: &[u8]) -> EncodedImage {
        let (image, update) = section.encode(layout_id, pixels).unwrap();
        section.commit(update);
        image
    }

    #[test]
    fn test_differential_key_frame_cadence() {
        let mut section = section(3);
        let modes: Vec<u8> = (0..7u8)
            .map(|i| write(&mut section, 2, &[i; 8]).byte_mode)
            .collect();

        assert_eq!(
            modes,
            vec![
                BYTE_MODE_KEY_FRAME,
                BYTE_MODE_DIFF,
                BYTE_MODE_DIFF,
                BYTE_MODE_KEY_FRAME,
                BYTE_MODE_DIFF,
                BYTE_MODE_DIFF,
                BYTE_MODE_KEY_FRAME
            ]
        );
    }

    #[test]
    fn test_differential_decodes_against_previous() {
        let mut section = section(32);
        let first = [10u8, 20, 30, 40, 50, 60, 70, 80];
        let second = [11u8, 19, 30, 200, 0, 60, 70, 81];

        let a = write(&mut section, 2, &first);
        let b = write(&mut section, 2, &second);
        assert_eq!(b.byte_mode, BYTE_MODE_DIFF);

        let decoded_a = section.decode(&a, None).unwrap();
        assert_eq!(decoded_a, first);
        assert_eq!(section.decode(&b, Some(&decoded_a)).unwrap(), second);
        assert!(matches!(section.decode(&b, None), Err(AavError::Corrupt(_))));
    }

    #[test]
    fn test_raw_layouts_always_key_frames() {
        let mut section = section(32);
        for layout in [1, 3] {
            for _ in 0..3 {
                let image = write(&mut section, layout, &[5u8; 8]);
                assert_eq!(image.byte_mode, BYTE_MODE_KEY_FRAME);
            }
        }
        assert_eq!(write(&mut section, 1, &[5u8; 8]).payload, vec![5u8; 8]);
    }

    #[test]
    fn test_uncommitted_encode_leaves_chain() {
        let mut section = section(32);
        let first = write(&mut section, 2, &[10u8; 8]);

        // Encoded but never written.
        let (abandoned, _) = section.encode(2, &[99u8; 8]).unwrap();
        assert_eq!(abandoned.byte_mode, BYTE_MODE_DIFF);

        let next = write(&mut section, 2, &[20u8; 8]);
        assert_eq!(next.byte_mode, BYTE_MODE_DIFF);
        let base = section.decode(&first, None).unwrap();
        assert_eq!(section.decode(&next, Some(&base)).unwrap(), vec![20u8; 8]);
    }

    #[test]
    fn test_rejects_unknown_layout_and_bad_size() {
        let section = section(32);
        assert!(matches!(
            section.encode(9, &[0u8; 8]),
            Err(AavError::UnknownLayout(9))
        ));
        assert!(matches!(
            section.encode(1, &[0u8; 7]),
            Err(AavError::InvalidImageSize {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_only_8bit_supported() {
        assert!(matches!(
            ImageSection::new(4, 4, 16),
            Err(AavError::UnsupportedBitDepth(16))
        ));
    }

    #[test]
    fn test_layout_choice_parse() {
        assert_eq!(
            "Compressed".parse::<ImageLayoutChoice>().unwrap(),
            ImageLayoutChoice::Compressed
        );
        assert_eq!(ImageLayoutChoice::Raw.layout_id(), 1);
        assert!("quicklz".parse::<ImageLayoutChoice>().is_err());
    }
}
