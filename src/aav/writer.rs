//! Streaming AAV writer.
//!
//! Definitions (tags, image section, layouts, status tags) are collected
//! until the first frame begins, at which point the header is written and
//! the definitions are sealed. Each completed frame is flushed to disk so an
//! interrupted recording keeps every finished frame.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::image_section::{ChainUpdate, EncodedImage, ImageLayout, ImageSection};
use super::index::{FrameIndex, IndexEntry};
use super::status_section::{StatusSection, StatusValue, TagType};
use super::wire::*;
use super::{
    AavError, FILE_MAGIC, FORMAT_VERSION, FRAME_COUNT_POSITION, FRAME_MAGIC,
    INDEX_OFFSET_POSITION,
};

struct PendingFrame {
    timestamp: i64,
    elapsed_ms: u32,
    exposure: u32,
    image: Option<(EncodedImage, ChainUpdate)>,
    values: Vec<(u16, StatusValue)>,
}

/// Writes one AAV recording.
pub struct AavFileWriter {
    path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    file_tags: Vec<(String, String)>,
    user_tags: Vec<(String, String)>,
    image: Option<ImageSection>,
    status: StatusSection,
    header_written: bool,
    pending: Option<PendingFrame>,
    index: FrameIndex,
}

fn upsert(tags: &mut Vec<(String, String)>, key: &str, value: &str) {
    match tags.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => tags.push((key.to_string(), value.to_string())),
    }
}

impl AavFileWriter {
    /// Creates a new file. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AavError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!(path = %path.display(), "Created AAV file");

        Ok(Self {
            path,
            file: BufWriter::new(file),
            position: 0,
            file_tags: Vec::new(),
            user_tags: Vec::new(),
            image: None,
            status: StatusSection::new(),
            header_written: false,
            pending: None,
            index: FrameIndex::new(),
        })
    }

    fn ensure_open_header(&self) -> Result<(), AavError> {
        if self.header_written {
            Err(AavError::HeaderSealed)
        } else {
            Ok(())
        }
    }

    fn image_mut(&mut self) -> Result<&mut ImageSection, AavError> {
        self.image.as_mut().ok_or(AavError::NoImageSection)
    }

    /// Sets a header tag, replacing an earlier value for `key`.
    pub fn add_file_tag(&mut self, key: &str, value: &str) -> Result<(), AavError> {
        self.ensure_open_header()?;
        upsert(&mut self.file_tags, key, value);
        Ok(())
    }

    /// Sets a user tag, replacing an earlier value for `key`.
    pub fn add_user_tag(&mut self, key: &str, value: &str) -> Result<(), AavError> {
        self.ensure_open_header()?;
        upsert(&mut self.user_tags, key, value);
        Ok(())
    }

    /// Defines the frame geometry. Only 8 bits per pixel is supported.
    pub fn define_image_section(&mut self, width: u32, height: u32, bpp: u8) -> Result<(), AavError> {
        self.ensure_open_header()?;
        self.image = Some(ImageSection::new(width, height, bpp)?);
        Ok(())
    }

    /// Adds a layout frames can be written with.
    pub fn define_image_layout(&mut self, layout: ImageLayout) -> Result<(), AavError> {
        self.ensure_open_header()?;
        self.image_mut()?.add_layout(layout)
    }

    /// Sets a tag on the image section.
    pub fn add_image_section_tag(&mut self, key: &str, value: &str) -> Result<(), AavError> {
        self.ensure_open_header()?;
        self.image_mut()?.add_or_update_tag(key, value);
        Ok(())
    }

    /// Declares a status channel and returns its tag id.
    pub fn define_status_tag(&mut self, name: &str, tag_type: TagType) -> Result<u16, AavError> {
        self.ensure_open_header()?;
        self.status.define(name, tag_type)
    }

    fn write_header(&mut self) -> Result<(), AavError> {
        let image = self.image.as_ref().ok_or(AavError::NoImageSection)?;

        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(FILE_MAGIC);
        put_u8(&mut buf, FORMAT_VERSION);
        put_u64(&mut buf, 0);
        put_u32(&mut buf, 0);
        put_tags(&mut buf, &self.file_tags);
        put_tags(&mut buf, &self.user_tags);
        image.write(&mut buf);
        self.status.write(&mut buf);

        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.position = buf.len() as u64;
        self.header_written = true;
        Ok(())
    }

    /// Starts a frame. Writes the header first if needed.
    pub fn begin_frame(&mut self, timestamp: i64, elapsed_ms: u32, exposure: u32) -> Result<(), AavError> {
        if self.pending.is_some() {
            return Err(AavError::FrameInProgress);
        }
        if !self.header_written {
            self.write_header()?;
        }
        self.pending = Some(PendingFrame {
            timestamp,
            elapsed_ms,
            exposure,
            image: None,
            values: Vec::new(),
        });
        Ok(())
    }

    /// Sets the frame image, encoded with the given layout.
    ///
    /// Calling it again replaces the image. Differential chains only move
    /// on when the frame is ended.
    pub fn add_image(&mut self, layout_id: u8, pixels: &[u8]) -> Result<(), AavError> {
        let pending = self.pending.as_mut().ok_or(AavError::NoFrameInProgress)?;
        let image = self.image.as_ref().ok_or(AavError::NoImageSection)?;
        pending.image = Some(image.encode(layout_id, pixels)?);
        Ok(())
    }

    fn set_value(&mut self, tag_id: u16, value: StatusValue) -> Result<(), AavError> {
        self.status.check(tag_id, value.tag_type())?;
        let pending = self.pending.as_mut().ok_or(AavError::NoFrameInProgress)?;
        match pending.values.iter_mut().find(|(id, _)| *id == tag_id) {
            Some((_, existing)) => *existing = value,
            None => pending.values.push((tag_id, value)),
        }
        Ok(())
    }

    /// Sets a text value on the current frame.
    pub fn add_status_tag_text(&mut self, tag_id: u16, value: &str) -> Result<(), AavError> {
        self.set_value(tag_id, StatusValue::Text(value.to_string()))
    }

    /// Sets an 8-bit value on the current frame.
    pub fn add_status_tag_u8(&mut self, tag_id: u16, value: u8) -> Result<(), AavError> {
        self.set_value(tag_id, StatusValue::UInt8(value))
    }

    /// Sets a 16-bit value on the current frame.
    pub fn add_status_tag_u16(&mut self, tag_id: u16, value: u16) -> Result<(), AavError> {
        self.set_value(tag_id, StatusValue::UInt16(value))
    }

    /// Sets a 64-bit value on the current frame.
    pub fn add_status_tag_u64(&mut self, tag_id: u16, value: u64) -> Result<(), AavError> {
        self.set_value(tag_id, StatusValue::UInt64(value))
    }

    /// Sets a real value on the current frame.
    pub fn add_status_tag_real(&mut self, tag_id: u16, value: f32) -> Result<(), AavError> {
        self.set_value(tag_id, StatusValue::Real(value))
    }

    /// Appends one message to a messages tag of the current frame.
    pub fn add_status_message(&mut self, tag_id: u16, message: &str) -> Result<(), AavError> {
        self.status.check(tag_id, TagType::Messages)?;
        let pending = self.pending.as_mut().ok_or(AavError::NoFrameInProgress)?;
        match pending.values.iter_mut().find(|(id, _)| *id == tag_id) {
            Some((_, StatusValue::Messages(messages))) => messages.push(message.to_string()),
            _ => pending
                .values
                .push((tag_id, StatusValue::Messages(vec![message.to_string()]))),
        }
        Ok(())
    }

    /// Writes the current frame record and flushes it to disk.
    pub fn end_frame(&mut self) -> Result<(), AavError> {
        let frame = self.pending.take().ok_or(AavError::NoFrameInProgress)?;

        let payload_len = frame.image.as_ref().map_or(0, |(i, _)| i.payload.len());
        let mut buf = Vec::with_capacity(payload_len + 64);
        put_u32(&mut buf, FRAME_MAGIC);
        put_i64(&mut buf, frame.timestamp);
        put_u32(&mut buf, frame.elapsed_ms);
        put_u32(&mut buf, frame.exposure);
        match &frame.image {
            Some((image, _)) => {
                put_u8(&mut buf, image.layout_id);
                put_u8(&mut buf, image.byte_mode);
                put_u32(&mut buf, image.payload.len() as u32);
                buf.extend_from_slice(&image.payload);
            }
            None => {
                put_u8(&mut buf, 0);
                put_u8(&mut buf, 0);
                put_u32(&mut buf, 0);
            }
        }
        put_u16(&mut buf, frame.values.len() as u16);
        for (tag_id, value) in &frame.values {
            put_u16(&mut buf, *tag_id);
            value.write(&mut buf);
        }

        self.file.write_all(&buf)?;
        self.file.flush()?;

        if let (Some((_, update)), Some(section)) = (frame.image, self.image.as_mut()) {
            section.commit(update);
        }
        self.index.push(IndexEntry {
            elapsed_ms: frame.elapsed_ms,
            offset: self.position,
            length: buf.len() as u32,
        });
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Drops the frame in progress without writing it.
    pub fn discard_frame(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Number of frame records written.
    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ends any pending frame, writes the index and seals the file.
    ///
    /// Returns the number of frames in the file.
    pub fn finish(mut self) -> Result<usize, AavError> {
        if self.pending.is_some() {
            self.end_frame()?;
        }
        if !self.header_written {
            self.write_header()?;
        }

        let index_offset = self.position;
        let mut buf = Vec::with_capacity(8 + self.index.len() * 16);
        self.index.write(&mut buf);
        self.file.write_all(&buf)?;

        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(INDEX_OFFSET_POSITION))?;
        file.write_all(&index_offset.to_le_bytes())?;
        debug_assert_eq!(INDEX_OFFSET_POSITION + 8, FRAME_COUNT_POSITION);
        file.write_all(&(self.index.len() as u32).to_le_bytes())?;
        file.sync_all()?;

        info!(
            path = %self.path.display(),
            frames = self.index.len(),
            bytes = index_offset + buf.len() as u64,
            "Sealed AAV file"
        );
        Ok(self.index.len())
    }
}
