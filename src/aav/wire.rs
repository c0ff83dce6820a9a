//! Little-endian primitives shared by the AAV writer and reader.

use std::io::Read;

use super::AavError;

pub(crate) fn put_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Writes a u16 length followed by the UTF-8 bytes, truncated to fit.
pub(crate) fn put_str(buf: &mut Vec<u8>, value: &str) {
    let mut end = value.len().min(u16::MAX as usize);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    put_u16(buf, end as u16);
    buf.extend_from_slice(&value.as_bytes()[..end]);
}

pub(crate) fn put_tags(buf: &mut Vec<u8>, tags: &[(String, String)]) {
    put_u16(buf, tags.len() as u16);
    for (key, value) in tags {
        put_str(buf, key);
        put_str(buf, value);
    }
}

fn read_array<const N: usize>(r: &mut impl Read) -> Result<[u8; N], AavError> {
    let mut bytes = [0u8; N];
    r.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub(crate) fn read_u8(r: &mut impl Read) -> Result<u8, AavError> {
    Ok(read_array::<1>(r)?[0])
}

pub(crate) fn read_u16(r: &mut impl Read) -> Result<u16, AavError> {
    Ok(u16::from_le_bytes(read_array(r)?))
}

pub(crate) fn read_u32(r: &mut impl Read) -> Result<u32, AavError> {
    Ok(u32::from_le_bytes(read_array(r)?))
}

pub(crate) fn read_u64(r: &mut impl Read) -> Result<u64, AavError> {
    Ok(u64::from_le_bytes(read_array(r)?))
}

pub(crate) fn read_i64(r: &mut impl Read) -> Result<i64, AavError> {
    Ok(i64::from_le_bytes(read_array(r)?))
}

pub(crate) fn read_f32(r: &mut impl Read) -> Result<f32, AavError> {
    Ok(f32::from_le_bytes(read_array(r)?))
}

pub(crate) fn read_bytes(r: &mut impl Read, len: usize) -> Result<Vec<u8>, AavError> {
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub(crate) fn read_str(r: &mut impl Read) -> Result<String, AavError> {
    let len = read_u16(r)? as usize;
    String::from_utf8(read_bytes(r, len)?)
        .map_err(|e| AavError::Corrupt(format!("invalid UTF-8 string: {e}")))
}

pub(crate) fn read_tags(r: &mut impl Read) -> Result<Vec<(String, String)>, AavError> {
    let count = read_u16(r)?;
    let mut tags = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = read_str(r)?;
        let value = read_str(r)?;
        tags.push((key, value));
    }
    Ok(tags)
}
