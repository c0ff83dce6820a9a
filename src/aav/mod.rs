//! The AAV recording file format.
//!
//! A file holds a header (file tags, user tags, image section and status
//! section), followed by frame records and, once sealed, a frame index.
//! All integers are little-endian.
//!
//! ```text
//! "AAVF" u8 version
//! u64 index-offset u32 frame-count     (0 while unsealed)
//! file tags, user tags
//! image section, status section
//! frame records...
//! "INDX" index entries
//! ```

mod codec;
mod image_section;
mod index;
mod reader;
mod status_section;
mod wire;
mod writer;

pub use codec::{compression_ratio, Compression};
pub use image_section::{
    standard_layouts, ChainUpdate, EncodedImage, ImageLayout, ImageLayoutChoice, ImageSection,
    BYTE_MODE_DIFF, BYTE_MODE_KEY_FRAME, DIFF_BASE_PREVIOUS_FRAME, LAYOUT_FULL_IMAGE_DIFFERENTIAL,
    LAYOUT_FULL_IMAGE_RAW,
};
pub use index::{FrameIndex, IndexEntry};
pub use reader::{AavFileReader, AavFrame};
pub use status_section::{StatusSection, StatusTag, StatusValue, TagType};
pub use writer::AavFileWriter;

use thiserror::Error;

/// File magic.
pub const FILE_MAGIC: &[u8; 4] = b"AAVF";
/// Container framing version.
pub const FORMAT_VERSION: u8 = 1;
/// Frame record marker.
pub const FRAME_MAGIC: u32 = 0xEE01_22FF;
/// Index magic.
pub const INDEX_MAGIC: &[u8; 4] = b"INDX";

/// Byte offset of the u64 index offset in the preamble.
pub(crate) const INDEX_OFFSET_POSITION: u64 = 5;
/// Byte offset of the u32 frame count in the preamble.
pub(crate) const FRAME_COUNT_POSITION: u64 = 13;

/// Errors from reading or writing AAV files.
#[derive(Debug, Error)]
pub enum AavError {
    /// Reading or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Definitions cannot change once the first frame is written.
    #[error("header already written, definitions are sealed")]
    HeaderSealed,

    /// No layout with this id is defined.
    #[error("unknown image layout {0}")]
    UnknownLayout(u8),

    /// No status tag with this id is defined.
    #[error("unknown status tag id {0}")]
    UnknownStatusTag(u16),

    /// A value of the wrong type was given for a status tag.
    #[error("status tag {tag:?} is {expected:?}, not {actual:?}")]
    TagTypeMismatch {
        /// Tag name.
        tag: String,
        /// Declared type.
        expected: TagType,
        /// Type of the rejected value.
        actual: TagType,
    },

    /// Frame data was added outside `begin_frame`/`end_frame`.
    #[error("no frame in progress")]
    NoFrameInProgress,

    /// `begin_frame` was called before the previous frame ended.
    #[error("a frame is already in progress")]
    FrameInProgress,

    /// Pixel buffer does not match the image section size.
    #[error("image has {actual} bytes, expected {expected}")]
    InvalidImageSize {
        /// Pixels per frame.
        expected: usize,
        /// Length of the given buffer.
        actual: usize,
    },

    /// Only 8 bits per pixel is supported.
    #[error("unsupported bit depth {0}, only 8 bpp is supported")]
    UnsupportedBitDepth(u8),

    /// A frame was started before the image section was defined.
    #[error("image section not defined")]
    NoImageSection,

    /// The file is damaged or not an AAV file.
    #[error("corrupt file: {0}")]
    Corrupt(String),

    /// A compressed payload could not be decoded.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The file has already been sealed.
    #[error("file is sealed")]
    Sealed,
}
