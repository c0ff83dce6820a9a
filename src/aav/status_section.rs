//! Status section: the typed per-frame metadata channels of a recording.

use std::io::Read;

use super::wire::*;
use super::AavError;

/// Value type of a status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagType {
    /// UTF-8 text.
    Text = 0,
    /// Unsigned 8-bit integer.
    UInt8 = 1,
    /// Unsigned 16-bit integer.
    UInt16 = 2,
    /// Unsigned 64-bit integer.
    UInt64 = 3,
    /// 32-bit float.
    Real = 4,
    /// A list of text messages, appended one at a time within a frame.
    Messages = 5,
}

impl TagType {
    /// Parses a stored type byte.
    pub fn from_u8(value: u8) -> Result<Self, AavError> {
        Ok(match value {
            0 => Self::Text,
            1 => Self::UInt8,
            2 => Self::UInt16,
            3 => Self::UInt64,
            4 => Self::Real,
            5 => Self::Messages,
            other => return Err(AavError::Corrupt(format!("unknown tag type {other}"))),
        })
    }
}

/// A status value attached to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusValue {
    /// A [`TagType::Text`] value.
    Text(String),
    /// A [`TagType::UInt8`] value.
    UInt8(u8),
    /// A [`TagType::UInt16`] value.
    UInt16(u16),
    /// A [`TagType::UInt64`] value.
    UInt64(u64),
    /// A [`TagType::Real`] value.
    Real(f32),
    /// Messages in the order they were added.
    Messages(Vec<String>),
}

impl StatusValue {
    /// Type this value is stored as.
    pub fn tag_type(&self) -> TagType {
        match self {
            Self::Text(_) => TagType::Text,
            Self::UInt8(_) => TagType::UInt8,
            Self::UInt16(_) => TagType::UInt16,
            Self::UInt64(_) => TagType::UInt64,
            Self::Real(_) => TagType::Real,
            Self::Messages(_) => TagType::Messages,
        }
    }

    /// Widens integer values; `None` for text, reals and messages.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::UInt8(v) => Some(v.into()),
            Self::UInt16(v) => Some(v.into()),
            Self::UInt64(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        put_u8(buf, self.tag_type() as u8);
        match self {
            Self::Text(s) => put_str(buf, s),
            Self::UInt8(v) => put_u8(buf, *v),
            Self::UInt16(v) => put_u16(buf, *v),
            Self::UInt64(v) => put_u64(buf, *v),
            Self::Real(v) => put_f32(buf, *v),
            Self::Messages(messages) => {
                put_u16(buf, messages.len() as u16);
                for message in messages {
                    put_str(buf, message);
                }
            }
        }
    }

    pub(crate) fn read(r: &mut impl Read) -> Result<Self, AavError> {
        Ok(match TagType::from_u8(read_u8(r)?)? {
            TagType::Text => Self::Text(read_str(r)?),
            TagType::UInt8 => Self::UInt8(read_u8(r)?),
            TagType::UInt16 => Self::UInt16(read_u16(r)?),
            TagType::UInt64 => Self::UInt64(read_u64(r)?),
            TagType::Real => Self::Real(read_f32(r)?),
            TagType::Messages => {
                let count = read_u16(r)?;
                Self::Messages((0..count).map(|_| read_str(r)).collect::<Result<_, _>>()?)
            }
        })
    }
}

/// A declared status channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTag {
    /// Tag name, e.g. `SystemTime`.
    pub name: String,
    /// Type of every value of the tag.
    pub tag_type: TagType,
}

/// Ordered status tag definitions. A tag's id is its definition index.
#[derive(Debug, Clone, Default)]
pub struct StatusSection {
    tags: Vec<StatusTag>,
}

impl StatusSection {
    /// Creates an empty section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a tag and returns its id. Redefining a name returns the
    /// existing id when the type matches.
    pub fn define(&mut self, name: &str, tag_type: TagType) -> Result<u16, AavError> {
        if let Some(id) = self.find(name) {
            let existing = self.tags[id as usize].tag_type;
            if existing != tag_type {
                return Err(AavError::TagTypeMismatch {
                    tag: name.to_string(),
                    expected: existing,
                    actual: tag_type,
                });
            }
            return Ok(id);
        }
        if self.tags.len() >= u16::MAX as usize {
            return Err(AavError::Corrupt("too many status tags".to_string()));
        }
        self.tags.push(StatusTag {
            name: name.to_string(),
            tag_type,
        });
        Ok((self.tags.len() - 1) as u16)
    }

    /// Id of the tag called `name`.
    pub fn find(&self, name: &str) -> Option<u16> {
        self.tags
            .iter()
            .position(|t| t.name == name)
            .map(|i| i as u16)
    }

    /// Definition of tag `id`.
    pub fn get(&self, id: u16) -> Option<&StatusTag> {
        self.tags.get(id as usize)
    }

    /// Checks that `id` exists and carries `tag_type`.
    pub fn check(&self, id: u16, tag_type: TagType) -> Result<(), AavError> {
        let tag = self.get(id).ok_or(AavError::UnknownStatusTag(id))?;
        if tag.tag_type != tag_type {
            return Err(AavError::TagTypeMismatch {
                tag: tag.name.clone(),
                expected: tag.tag_type,
                actual: tag_type,
            });
        }
        Ok(())
    }

    /// All definitions in id order.
    pub fn tags(&self) -> &[StatusTag] {
        &self.tags
    }

    /// Number of defined tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True if no tag is defined.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.tags.len() as u16);
        for tag in &self.tags {
            put_str(buf, &tag.name);
            put_u8(buf, tag.tag_type as u8);
        }
    }

    pub(crate) fn read(r: &mut impl Read) -> Result<Self, AavError> {
        let count = read_u16(r)?;
        let mut tags = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = read_str(r)?;
            let tag_type = TagType::from_u8(read_u8(r)?)?;
            tags.push(StatusTag { name, tag_type });
        }
        Ok(Self { tags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ids_follow_definition_order() {
        let mut section = StatusSection::new();
        assert_eq!(section.define("SystemTime", TagType::UInt64).unwrap(), 0);
        assert_eq!(section.define("IntegratedFrames", TagType::UInt16).unwrap(), 1);
        assert_eq!(section.define("SystemTime", TagType::UInt64).unwrap(), 0);
        assert_eq!(section.len(), 2);
    }

    #[test]
    fn test_redefinition_with_other_type_rejected() {
        let mut section = StatusSection::new();
        section.define("Gain", TagType::Real).unwrap();

        assert!(matches!(
            section.define("Gain", TagType::UInt8),
            Err(AavError::TagTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_check() {
        let mut section = StatusSection::new();
        let id = section.define("Notes", TagType::Messages).unwrap();

        assert!(section.check(id, TagType::Messages).is_ok());
        assert!(section.check(id, TagType::Text).is_err());
        assert!(matches!(
            section.check(7, TagType::Text),
            Err(AavError::UnknownStatusTag(7))
        ));
    }

    #[test]
    fn test_values_decode() {
        let values = [
            StatusValue::Text("PAL".into()),
            StatusValue::UInt8(3),
            StatusValue::UInt16(512),
            StatusValue::UInt64(u64::MAX),
            StatusValue::Real(0.25),
            StatusValue::Messages(vec!["a".into(), "bc".into()]),
        ];
        let mut buf = Vec::new();
        for v in &values {
            v.write(&mut buf);
        }

        let mut cursor = Cursor::new(buf);
        for v in &values {
            assert_eq!(&StatusValue::read(&mut cursor).unwrap(), v);
        }
    }
}
