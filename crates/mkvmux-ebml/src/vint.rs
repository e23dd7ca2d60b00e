//! EBML variable-length integers and payload size helpers.
//!
//! Element sizes are written as varints whose length is given by the number
//! of leading zero bits of the first byte. A varint of length `n` carries
//! `7 * n` value bits; the all-ones value is reserved for "unknown size".

use bytes::BufMut;
use std::io::Read;

use crate::{ElementId, Error, Result};

/// Longest varint EBML allows.
pub const MAX_VINT_LENGTH: usize = 8;

/// Encoded 8-byte "unknown size" marker, used for live segments.
pub const UNKNOWN_SIZE_MARKER: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Largest value representable in a varint of `length` bytes.
fn max_value(length: usize) -> u64 {
    (1u64 << (7 * length)) - 2
}

/// Minimal number of bytes needed to encode `value` as a size varint.
pub fn vint_length(value: u64) -> usize {
    (1..=MAX_VINT_LENGTH)
        .find(|&len| value <= max_value(len))
        .unwrap_or(MAX_VINT_LENGTH)
}

/// Write `value` as a varint of exactly `length` bytes.
pub fn write_vint<B: BufMut>(buf: &mut B, value: u64, length: usize) -> Result<()> {
    if !(1..=MAX_VINT_LENGTH).contains(&length) || value > max_value(length) {
        return Err(Error::VintOverflow { value, length });
    }

    let marked = value | (1u64 << (7 * length));
    let bytes = marked.to_be_bytes();
    buf.put_slice(&bytes[8 - length..]);
    Ok(())
}

/// Encode `value` as a varint of exactly `length` bytes.
pub fn encode_vint(value: u64, length: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(length);
    write_vint(&mut out, value, length)?;
    Ok(out)
}

/// Length of a varint from its first byte, `None` for the invalid `0x00` byte.
pub fn vint_length_from_first_byte(first: u8) -> Option<usize> {
    match first.leading_zeros() as usize {
        n if n < MAX_VINT_LENGTH => Some(n + 1),
        _ => None,
    }
}

/// Decode a size varint from the front of `data`.
///
/// Returns the value (`None` for the reserved unknown-size value) and the
/// number of bytes consumed.
pub fn decode_vint(data: &[u8]) -> Result<(Option<u64>, usize)> {
    let first = *data.first().ok_or(Error::BufferUnderflow { need: 1, have: 0 })?;
    let length = vint_length_from_first_byte(first).ok_or(Error::InvalidVint { offset: 0 })?;
    if data.len() < length {
        return Err(Error::BufferUnderflow {
            need: length,
            have: data.len(),
        });
    }

    let mut value = u64::from(first) & ((1u64 << (8 - length)) - 1);
    for byte in &data[1..length] {
        value = (value << 8) | u64::from(*byte);
    }

    let unknown = (1u64 << (7 * length)) - 1;
    Ok((if value == unknown { None } else { Some(value) }, length))
}

/// Decode an element ID from the front of `data`.
pub fn decode_id(data: &[u8]) -> Result<(ElementId, usize)> {
    let first = *data.first().ok_or(Error::BufferUnderflow { need: 1, have: 0 })?;
    let length = match vint_length_from_first_byte(first) {
        Some(len) if len <= 4 => len,
        _ => return Err(Error::InvalidVint { offset: 0 }),
    };
    if data.len() < length {
        return Err(Error::BufferUnderflow {
            need: length,
            have: data.len(),
        });
    }

    let id = data[..length]
        .iter()
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
    Ok((ElementId(id), length))
}

/// Read an element ID from a stream.
pub fn read_id<R: Read + ?Sized>(reader: &mut R) -> Result<(ElementId, usize)> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf[..1])?;
    let length = match vint_length_from_first_byte(buf[0]) {
        Some(len) if len <= 4 => len,
        _ => return Err(Error::InvalidVint { offset: 0 }),
    };
    reader.read_exact(&mut buf[1..length])?;
    decode_id(&buf[..length])
}

/// Read a size varint from a stream.
pub fn read_vint<R: Read + ?Sized>(reader: &mut R) -> Result<(Option<u64>, usize)> {
    let mut buf = [0u8; MAX_VINT_LENGTH];
    reader.read_exact(&mut buf[..1])?;
    let length = vint_length_from_first_byte(buf[0]).ok_or(Error::InvalidVint { offset: 0 })?;
    reader.read_exact(&mut buf[1..length])?;
    decode_vint(&buf[..length])
}

/// Bytes needed for an unsigned integer payload. Zero still takes one byte.
pub fn uint_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Bytes needed for a signed integer payload in two's complement.
pub fn int_size(value: i64) -> usize {
    (1..8)
        .find(|&len| {
            let bits = 8 * len as u32;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            (min..=max).contains(&value)
        })
        .unwrap_or(8)
}

/// Total size of an element header plus a body of `body_size` bytes.
pub fn element_size(id: ElementId, body_size: u64) -> u64 {
    id.encoded_len() as u64 + vint_length(body_size) as u64 + body_size
}

/// Total size of an unsigned integer element holding `value`.
pub fn uint_element_size(id: ElementId, value: u64) -> u64 {
    element_size(id, uint_size(value) as u64)
}

/// Length of a signed varint (used by EBML lacing) holding `value`.
pub fn signed_vint_length(value: i64) -> usize {
    (1..=MAX_VINT_LENGTH)
        .find(|&len| {
            let bias = (1i64 << (7 * len - 1)) - 1;
            value.abs() < bias
        })
        .unwrap_or(MAX_VINT_LENGTH)
}

/// Write a signed varint as used by EBML lacing.
pub fn write_signed_vint<B: BufMut>(buf: &mut B, value: i64) -> Result<usize> {
    let length = signed_vint_length(value);
    let bias = (1i64 << (7 * length - 1)) - 1;
    write_vint(buf, (value + bias) as u64, length)?;
    Ok(length)
}

/// Decode a signed varint as used by EBML lacing.
pub fn decode_signed_vint(data: &[u8]) -> Result<(i64, usize)> {
    let (raw, length) = decode_vint(data)?;
    let raw = raw.ok_or(Error::InvalidVint { offset: 0 })?;
    let bias = (1i64 << (7 * length - 1)) - 1;
    Ok((raw as i64 - bias, length))
}
