//! Element reading.
//!
//! The muxer only reads back what it wrote itself (the EBML head when its
//! version fields are patched, and files in tests), so the reader is
//! schema-driven and strict: unknown IDs are kept as opaque binary payloads,
//! unknown-size elements are only accepted at the header level.

use std::io::Read;

use bytes::Bytes;

use crate::schema::{self, ElementType};
use crate::vint::{decode_id, decode_vint, read_id, read_vint};
use crate::{EbmlElement, ElementId, ElementValue, Error, Result};

/// Upper bound for element bodies loaded into memory by [`read_element`].
pub const MAX_READ_ELEMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Decoded element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// Element ID.
    pub id: ElementId,
    /// Body size, `None` for unknown-size elements.
    pub size: Option<u64>,
    /// Bytes taken by ID and size field.
    pub header_length: usize,
    /// Bytes taken by the size field alone.
    pub size_length: usize,
}

impl ElementHeader {
    /// Total element size, if known.
    pub fn total_size(&self) -> Option<u64> {
        self.size.map(|size| size + self.header_length as u64)
    }
}

/// Decode an element header from the front of `data`.
pub fn decode_element_header(data: &[u8]) -> Result<ElementHeader> {
    let (id, id_length) = decode_id(data)?;
    let (size, size_length) = decode_vint(&data[id_length..])?;
    Ok(ElementHeader {
        id,
        size,
        header_length: id_length + size_length,
        size_length,
    })
}

/// Read an element header from a stream.
pub fn read_element_header<R: Read + ?Sized>(reader: &mut R) -> Result<ElementHeader> {
    let (id, id_length) = read_id(reader)?;
    let (size, size_length) = read_vint(reader)?;
    Ok(ElementHeader {
        id,
        size,
        header_length: id_length + size_length,
        size_length,
    })
}

/// Read a complete element (header and body) from a stream.
pub fn read_element<R: Read + ?Sized>(reader: &mut R) -> Result<EbmlElement> {
    let header = read_element_header(reader)?;
    let size = header.size.ok_or_else(|| {
        Error::invalid_payload(header.id, "unknown size not supported here")
    })?;
    if size > MAX_READ_ELEMENT_SIZE {
        return Err(Error::ElementTooLarge {
            id: header.id,
            size,
        });
    }

    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body)?;

    let mut element = EbmlElement::new(header.id, parse_value(header.id, &body)?);
    element.size_length = Some(header.size_length);
    Ok(element)
}

/// Parse a single element from the front of `data`, returning it and the
/// number of bytes consumed.
pub fn parse_element(data: &[u8]) -> Result<(EbmlElement, usize)> {
    let header = decode_element_header(data)?;
    let size = header.size.ok_or_else(|| {
        Error::invalid_payload(header.id, "unknown size not supported here")
    })? as usize;

    let end = header.header_length + size;
    if data.len() < end {
        return Err(Error::BufferUnderflow {
            need: end,
            have: data.len(),
        });
    }

    let mut element = EbmlElement::new(
        header.id,
        parse_value(header.id, &data[header.header_length..end])?,
    );
    element.size_length = Some(header.size_length);
    Ok((element, end))
}

/// Parse consecutive elements filling all of `data`.
pub fn parse_elements(mut data: &[u8]) -> Result<Vec<EbmlElement>> {
    let mut elements = Vec::new();
    while !data.is_empty() {
        let (element, consumed) = parse_element(data)?;
        elements.push(element);
        data = &data[consumed..];
    }
    Ok(elements)
}

fn parse_value(id: ElementId, body: &[u8]) -> Result<ElementValue> {
    let value = match schema::element_type(id) {
        Some(ElementType::Master) => ElementValue::Master(parse_elements(body)?),
        Some(ElementType::UInt) => ElementValue::UInt(parse_uint(id, body)?),
        Some(ElementType::Int) => ElementValue::Int(parse_int(id, body)?),
        Some(ElementType::Float) => ElementValue::Float(parse_float(id, body)?),
        Some(ElementType::Date) => ElementValue::Date(parse_int(id, body)?),
        Some(ElementType::String) => {
            let text = body.split(|b| *b == 0).next().unwrap_or_default();
            let text = std::str::from_utf8(text)
                .map_err(|e| Error::invalid_payload(id, e.to_string()))?;
            ElementValue::String(text.to_string())
        }
        Some(ElementType::Binary) | None => ElementValue::Binary(Bytes::copy_from_slice(body)),
    };
    Ok(value)
}

fn parse_uint(id: ElementId, body: &[u8]) -> Result<u64> {
    if body.len() > 8 {
        return Err(Error::invalid_payload(id, "integer longer than 8 bytes"));
    }
    Ok(body.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn parse_int(id: ElementId, body: &[u8]) -> Result<i64> {
    if body.is_empty() {
        return Ok(0);
    }
    let unsigned = parse_uint(id, body)?;
    let shift = 64 - 8 * body.len() as u32;
    Ok(((unsigned << shift) as i64) >> shift)
}

fn parse_float(id: ElementId, body: &[u8]) -> Result<f64> {
    match body.len() {
        0 => Ok(0.0),
        4 => Ok(f64::from(f32::from_be_bytes([body[0], body[1], body[2], body[3]]))),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(body);
            Ok(f64::from_be_bytes(raw))
        }
        len => Err(Error::invalid_payload(
            id,
            format!("float payload of {len} bytes"),
        )),
    }
}
