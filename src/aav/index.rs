//! Frame index written when a recording is sealed.

use std::io::Read;

use super::wire::*;
use super::{AavError, INDEX_MAGIC};

/// Location of one frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Milliseconds since the start of the recording.
    pub elapsed_ms: u32,
    /// Byte offset of the record's first byte.
    pub offset: u64,
    /// Length of the whole record.
    pub length: u32,
}

/// Frame index of a recording, in write order.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    entries: Vec<IndexEntry>,
}

impl FrameIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the entry of a written frame.
    pub fn push(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    /// All entries in frame order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of indexed frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no frame has been indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(INDEX_MAGIC);
        put_u32(buf, self.entries.len() as u32);
        for e in &self.entries {
            put_u32(buf, e.elapsed_ms);
            put_u64(buf, e.offset);
            put_u32(buf, e.length);
        }
    }

    pub(crate) fn read(r: &mut impl Read) -> Result<Self, AavError> {
        let magic = read_bytes(r, INDEX_MAGIC.len())?;
        if magic != INDEX_MAGIC {
            return Err(AavError::Corrupt("index magic missing".to_string()));
        }
        let count = read_u32(r)?;
        let mut entries = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            entries.push(IndexEntry {
                elapsed_ms: read_u32(r)?,
                offset: read_u64(r)?,
                length: read_u32(r)?,
            });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_index_decodes() {
        let mut index = FrameIndex::new();
        index.push(IndexEntry {
            elapsed_ms: 0,
            offset: 120,
            length: 64,
        });
        index.push(IndexEntry {
            elapsed_ms: 40,
            offset: 184,
            length: 60,
        });
        let mut buf = Vec::new();
        index.write(&mut buf);

        let decoded = FrameIndex::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.entries(), index.entries());
    }

    #[test]
    fn test_bad_magic() {
        let result = FrameIndex::read(&mut Cursor::new(b"XXXX\0\0\0\0".to_vec()));
        assert!(matches!(result, Err(AavError::Corrupt(_))));
    }
}
