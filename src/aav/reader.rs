//! AAV file reader.
//!
//! Sealed files are read through their index. Files left unsealed by an
//! interrupted recording have their index rebuilt by scanning the frame
//! records that follow the header.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

use super::image_section::{EncodedImage, ImageLayout, ImageSection, BYTE_MODE_DIFF};
use super::index::{FrameIndex, IndexEntry};
use super::status_section::{StatusSection, StatusTag, StatusValue};
use super::wire::*;
use super::{AavError, FILE_MAGIC, FORMAT_VERSION, FRAME_MAGIC};

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AavFrame {
    /// Mid-exposure timestamp in ticks.
    pub timestamp: i64,
    /// Milliseconds since the recording started.
    pub elapsed_ms: u32,
    /// Exposure in tenths of a millisecond.
    pub exposure: u32,
    /// Layout the image was stored with, 0 if the frame has no image.
    pub layout_id: u8,
    /// Decoded 8-bit pixels, empty when the frame has no image.
    pub pixels: Vec<u8>,
    /// Status values keyed by tag id.
    pub values: Vec<(u16, StatusValue)>,
}

impl AavFrame {
    /// Looks up a status value by tag id.
    pub fn value(&self, tag_id: u16) -> Option<&StatusValue> {
        self.values
            .iter()
            .find(|(id, _)| *id == tag_id)
            .map(|(_, v)| v)
    }
}

struct Record {
    timestamp: i64,
    elapsed_ms: u32,
    exposure: u32,
    image: EncodedImage,
    values: Vec<(u16, StatusValue)>,
}

/// Random-access reader for AAV files.
pub struct AavFileReader {
    reader: BufReader<File>,
    version: u8,
    sealed: bool,
    file_tags: Vec<(String, String)>,
    user_tags: Vec<(String, String)>,
    image: ImageSection,
    status: StatusSection,
    index: FrameIndex,
}

impl AavFileReader {
    /// Opens a file and loads its header and index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AavError> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);

        let magic = read_bytes(&mut reader, FILE_MAGIC.len())?;
        if magic != FILE_MAGIC {
            return Err(AavError::Corrupt("not an AAV file".to_string()));
        }
        let version = read_u8(&mut reader)?;
        if version != FORMAT_VERSION {
            return Err(AavError::Corrupt(format!("unsupported version {version}")));
        }
        let index_offset = read_u64(&mut reader)?;
        let frame_count = read_u32(&mut reader)?;

        let file_tags = read_tags(&mut reader)?;
        let user_tags = read_tags(&mut reader)?;
        let image = ImageSection::read(&mut reader)?;
        let status = StatusSection::read(&mut reader)?;
        let header_end = reader.stream_position()?;

        let sealed = index_offset != 0;
        let index = if sealed {
            reader.seek(SeekFrom::Start(index_offset))?;
            let index = FrameIndex::read(&mut reader)?;
            if index.len() != frame_count as usize {
                return Err(AavError::Corrupt(format!(
                    "index holds {} frames, header says {frame_count}",
                    index.len()
                )));
            }
            index
        } else {
            let index = scan_records(&mut reader, header_end)?;
            warn!(
                path = %path.as_ref().display(),
                frames = index.len(),
                "AAV file was not sealed, rebuilt index from frame records"
            );
            index
        };

        Ok(Self {
            reader,
            version,
            sealed,
            file_tags,
            user_tags,
            image,
            status,
            index,
        })
    }

    /// Format version from the preamble.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// True if the file was closed properly.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Header tags in file order.
    pub fn file_tags(&self) -> &[(String, String)] {
        &self.file_tags
    }

    /// Looks up a file tag value.
    pub fn file_tag(&self, key: &str) -> Option<&str> {
        lookup(&self.file_tags, key)
    }

    /// User tags in file order.
    pub fn user_tags(&self) -> &[(String, String)] {
        &self.user_tags
    }

    /// Frame width.
    pub fn width(&self) -> u32 {
        self.image.width
    }

    /// Frame height.
    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// Bits per pixel.
    pub fn bpp(&self) -> u8 {
        self.image.bpp
    }

    /// Image layouts defined in the file.
    pub fn layouts(&self) -> impl Iterator<Item = &ImageLayout> {
        self.image.layouts()
    }

    /// Image section tags.
    pub fn image_tags(&self) -> &[(String, String)] {
        self.image.tags()
    }

    /// Looks up an image section tag value.
    pub fn image_tag(&self, key: &str) -> Option<&str> {
        lookup(self.image.tags(), key)
    }

    /// Status tag definitions; the index is the tag id.
    pub fn status_tags(&self) -> &[StatusTag] {
        self.status.tags()
    }

    /// Id of the named status tag.
    pub fn status_tag_id(&self, name: &str) -> Option<u16> {
        self.status.find(name)
    }

    /// Index entries, one per frame.
    pub fn index(&self) -> &[IndexEntry] {
        self.index.entries()
    }

    /// Number of frames in the file.
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    fn read_record(&mut self, i: usize) -> Result<Record, AavError> {
        let entry = *self
            .index
            .entries()
            .get(i)
            .ok_or_else(|| AavError::Corrupt(format!("frame {i} out of range")))?;
        self.reader.seek(SeekFrom::Start(entry.offset))?;
        read_record(&mut self.reader)
    }

    /// Reads and decodes frame `i`.
    ///
    /// Differential frames are rebuilt from the preceding key frame of the
    /// same layout.
    pub fn read_frame(&mut self, i: usize) -> Result<AavFrame, AavError> {
        let target = self.read_record(i)?;
        let layout_id = target.image.layout_id;

        let mut chain = Vec::new();
        let mut next_is_diff = target.image.byte_mode == BYTE_MODE_DIFF;
        let mut j = i;
        while next_is_diff {
            let base = loop {
                if j == 0 {
                    return Err(AavError::Corrupt(format!(
                        "frame {i} has no key frame to decode against"
                    )));
                }
                j -= 1;
                let record = self.read_record(j)?;
                if record.image.layout_id == layout_id {
                    break record;
                }
            };
            next_is_diff = base.image.byte_mode == BYTE_MODE_DIFF;
            chain.push(base.image);
        }

        let pixels = if layout_id == 0 {
            Vec::new()
        } else {
            let mut previous: Option<Vec<u8>> = None;
            for image in chain.iter().rev() {
                previous = Some(self.image.decode(image, previous.as_deref())?);
            }
            self.image.decode(&target.image, previous.as_deref())?
        };

        Ok(AavFrame {
            timestamp: target.timestamp,
            elapsed_ms: target.elapsed_ms,
            exposure: target.exposure,
            layout_id,
            pixels,
            values: target.values,
        })
    }
}

fn lookup<'a>(tags: &'a [(String, String)], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn read_record(r: &mut impl Read) -> Result<Record, AavError> {
    let magic = read_u32(r)?;
    if magic != FRAME_MAGIC {
        return Err(AavError::Corrupt(format!("bad frame marker {magic:#010x}")));
    }
    let timestamp = read_i64(r)?;
    let elapsed_ms = read_u32(r)?;
    let exposure = read_u32(r)?;
    let layout_id = read_u8(r)?;
    let byte_mode = read_u8(r)?;
    let len = read_u32(r)? as usize;
    let payload = read_bytes(r, len)?;
    let count = read_u16(r)?;
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag_id = read_u16(r)?;
        values.push((tag_id, StatusValue::read(r)?));
    }

    Ok(Record {
        timestamp,
        elapsed_ms,
        exposure,
        image: EncodedImage {
            layout_id,
            byte_mode,
            payload,
        },
        values,
    })
}

/// Rebuilds the index of an unsealed file. A trailing partial record is
/// dropped.
fn scan_records(reader: &mut BufReader<File>, start: u64) -> Result<FrameIndex, AavError> {
    let mut index = FrameIndex::new();
    let mut offset = start;
    reader.seek(SeekFrom::Start(start))?;
    loop {
        match read_record(reader) {
            Ok(record) => {
                let end = reader.stream_position()?;
                index.push(IndexEntry {
                    elapsed_ms: record.elapsed_ms,
                    offset,
                    length: (end - offset) as u32,
                });
                offset = end;
            }
            Err(AavError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(AavError::Corrupt(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aav::{standard_layouts, AavFileWriter, TagType};
    use tempfile::tempdir;

    fn write_frames(path: &Path, frames: &[Vec<u8>], layout: u8, seal: bool) {
        write_with_layouts(path, frames, &vec![layout; frames.len()], seal);
    }

    fn write_with_layouts(path: &Path, frames: &[Vec<u8>], layouts: &[u8], seal: bool) {
        let mut writer = AavFileWriter::create(path).unwrap();
        writer.add_file_tag("AAV-VERSION", "1").unwrap();
        writer.add_user_tag("OBSERVER", "test").unwrap();
        writer.define_image_section(4, 4, 8).unwrap();
        for l in standard_layouts(3) {
            writer.define_image_layout(l).unwrap();
        }
        writer.add_image_section_tag("IMAGE-MONOCHROME-MODE", "R").unwrap();
        let frames_tag = writer.define_status_tag("IntegratedFrames", TagType::UInt16).unwrap();

        for (i, (pixels, &layout)) in frames.iter().zip(layouts).enumerate() {
            writer.begin_frame(i as i64, i as u32 * 40, 400).unwrap();
            writer.add_image(layout, pixels).unwrap();
            writer.add_status_tag_u16(frames_tag, i as u16 + 1).unwrap();
            writer.end_frame().unwrap();
        }
        if seal {
            writer.finish().unwrap();
        }
    }

    fn ramp(n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|i| (0..16).map(|p| (p * 7 + i * 13) as u8).collect())
            .collect()
    }

    #[test]
    fn test_header_is_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.aav");
        write_frames(&path, &ramp(1), 1, true);

        let reader = AavFileReader::open(&path).unwrap();
        assert!(reader.is_sealed());
        assert_eq!(reader.file_tag("AAV-VERSION"), Some("1"));
        assert_eq!(reader.user_tags(), &[("OBSERVER".to_string(), "test".to_string())]);
        assert_eq!((reader.width(), reader.height(), reader.bpp()), (4, 4, 8));
        assert_eq!(reader.layouts().count(), 3);
        assert_eq!(reader.image_tag("IMAGE-MONOCHROME-MODE"), Some("R"));
        assert_eq!(reader.status_tag_id("IntegratedFrames"), Some(0));
    }

    #[test]
    fn test_differential_chain_decodes_every_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.aav");
        let frames = ramp(8);
        write_frames(&path, &frames, 2, true);

        let mut reader = AavFileReader::open(&path).unwrap();
        // Random access order exercises the walk back to the key frame.
        for i in [5usize, 0, 7, 2, 4, 1, 6, 3] {
            let frame = reader.read_frame(i).unwrap();
            assert_eq!(frame.pixels, frames[i], "frame {i}");
            assert_eq!(frame.value(0), Some(&StatusValue::UInt16(i as u16 + 1)));
        }
    }

    #[test]
    fn test_layouts_mix_within_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.aav");
        let frames = ramp(8);
        // Frame 5 diffs against frame 2 across two layout-3 frames; frame 7
        // starts a new key frame.
        let layouts = [2, 1, 2, 3, 3, 2, 1, 2];
        write_with_layouts(&path, &frames, &layouts, true);

        let mut reader = AavFileReader::open(&path).unwrap();
        for i in [5usize, 7, 0, 3, 2, 6, 1, 4] {
            let frame = reader.read_frame(i).unwrap();
            assert_eq!(frame.layout_id, layouts[i], "frame {i}");
            assert_eq!(frame.pixels, frames[i], "frame {i}");
        }
    }

    #[test]
    fn test_index_offsets_are_contiguous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("i.aav");
        write_frames(&path, &ramp(4), 3, true);

        let reader = AavFileReader::open(&path).unwrap();
        let index = reader.index();
        for pair in index.windows(2) {
            assert_eq!(pair[0].offset + u64::from(pair[0].length), pair[1].offset);
            assert!(pair[0].elapsed_ms < pair[1].elapsed_ms);
        }
    }

    #[test]
    fn test_unsealed_file_is_recovered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("u.aav");
        let frames = ramp(5);
        write_frames(&path, &frames, 2, false);

        let mut reader = AavFileReader::open(&path).unwrap();
        assert!(!reader.is_sealed());
        assert_eq!(reader.frame_count(), 5);
        assert_eq!(reader.read_frame(4).unwrap().pixels, frames[4]);
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.aav");
        write_frames(&path, &ramp(3), 1, false);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();

        let reader = AavFileReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 2);
    }

    #[test]
    fn test_not_an_aav_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("n.aav");
        std::fs::write(&path, b"RIFF0000AVI LIST").unwrap();

        assert!(matches!(AavFileReader::open(&path), Err(AavError::Corrupt(_))));
    }
}
