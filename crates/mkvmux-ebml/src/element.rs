//! Tagged EBML element representation.
//!
//! Every element the muxer emits is built as an [`EbmlElement`]: an ID plus a
//! value that is either a master (ordered children) or one of the leaf
//! payload types. Sizes are computed from the tree, so the exact number of
//! bytes an element will occupy is known before anything is written.

use bytes::{BufMut, Bytes, BytesMut};

use crate::schema::{self, DefaultValue};
use crate::vint::{int_size, uint_size, vint_length, write_vint};
use crate::{ElementId, Error, Result};

/// Payload of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Master(Vec<EbmlElement>),
    UInt(u64),
    Int(i64),
    Float(f64),
    String(String),
    Binary(Bytes),
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    Date(i64),
}

/// A single EBML element.
#[derive(Debug, Clone, PartialEq)]
pub struct EbmlElement {
    /// Element ID.
    pub id: ElementId,
    /// Element payload.
    pub value: ElementValue,
    /// Forced length of the size field; `None` writes the minimal length.
    pub size_length: Option<usize>,
}

impl EbmlElement {
    /// Create an element with a minimal size field.
    pub fn new(id: ElementId, value: ElementValue) -> Self {
        Self {
            id,
            value,
            size_length: None,
        }
    }

    /// Create a master element.
    pub fn master(id: ElementId, children: Vec<EbmlElement>) -> Self {
        Self::new(id, ElementValue::Master(children))
    }

    /// Create an unsigned integer element.
    pub fn uint(id: ElementId, value: u64) -> Self {
        Self::new(id, ElementValue::UInt(value))
    }

    /// Create a signed integer element.
    pub fn int(id: ElementId, value: i64) -> Self {
        Self::new(id, ElementValue::Int(value))
    }

    /// Create a float element.
    pub fn float(id: ElementId, value: f64) -> Self {
        Self::new(id, ElementValue::Float(value))
    }

    /// Create a UTF-8 string element.
    pub fn string(id: ElementId, value: impl Into<String>) -> Self {
        Self::new(id, ElementValue::String(value.into()))
    }

    /// Create a binary element.
    pub fn binary(id: ElementId, value: impl Into<Bytes>) -> Self {
        Self::new(id, ElementValue::Binary(value.into()))
    }

    /// Create a date element.
    pub fn date(id: ElementId, nanos_since_2001: i64) -> Self {
        Self::new(id, ElementValue::Date(nanos_since_2001))
    }

    /// Create a Void element occupying exactly `total_size` bytes.
    ///
    /// Returns `None` for sizes a Void cannot fill (0 and 1).
    pub fn void(total_size: u64) -> Option<Self> {
        let id_len = ElementId::VOID.encoded_len() as u64;
        (1..=8u64).find_map(|size_length| {
            let data = total_size.checked_sub(id_len + size_length)?;
            (vint_length(data) as u64 <= size_length).then(|| Self {
                id: ElementId::VOID,
                value: ElementValue::Binary(Bytes::from(vec![0u8; data as usize])),
                size_length: Some(size_length as usize),
            })
        })
    }

    /// Builder-style override of the size field length.
    pub fn with_size_length(mut self, size_length: usize) -> Self {
        self.size_length = Some(size_length);
        self
    }

    /// Size of the payload in bytes.
    pub fn data_size(&self) -> u64 {
        match &self.value {
            ElementValue::Master(children) => children.iter().map(EbmlElement::total_size).sum(),
            ElementValue::UInt(v) => uint_size(*v) as u64,
            ElementValue::Int(v) => int_size(*v) as u64,
            ElementValue::Float(_) | ElementValue::Date(_) => 8,
            ElementValue::String(s) => s.len() as u64,
            ElementValue::Binary(b) => b.len() as u64,
        }
    }

    /// Length of the size field as it will be written.
    pub fn size_field_length(&self) -> usize {
        self.size_length
            .unwrap_or_else(|| vint_length(self.data_size()))
    }

    /// Length of ID plus size field.
    pub fn header_size(&self) -> u64 {
        (self.id.encoded_len() + self.size_field_length()) as u64
    }

    /// Total number of bytes the element occupies when written.
    pub fn total_size(&self) -> u64 {
        self.header_size() + self.data_size()
    }

    /// Serialize the element into `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_slice(&self.id.to_bytes());
        write_vint(buf, self.data_size(), self.size_field_length())?;

        match &self.value {
            ElementValue::Master(children) => {
                for child in children {
                    child.encode(buf)?;
                }
            }
            ElementValue::UInt(v) => {
                let len = uint_size(*v);
                buf.put_slice(&v.to_be_bytes()[8 - len..]);
            }
            ElementValue::Int(v) => {
                let len = int_size(*v);
                buf.put_slice(&v.to_be_bytes()[8 - len..]);
            }
            ElementValue::Float(v) => buf.put_f64(*v),
            ElementValue::Date(v) => buf.put_i64(*v),
            ElementValue::String(s) => buf.put_slice(s.as_bytes()),
            ElementValue::Binary(b) => buf.put_slice(b),
        }

        Ok(())
    }

    /// Serialize the element into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.total_size() as usize);
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Children of a master element; empty for leaves.
    pub fn children(&self) -> &[EbmlElement] {
        match &self.value {
            ElementValue::Master(children) => children,
            _ => &[],
        }
    }

    /// Mutable children of a master element.
    pub fn children_mut(&mut self) -> Option<&mut Vec<EbmlElement>> {
        match &mut self.value {
            ElementValue::Master(children) => Some(children),
            _ => None,
        }
    }

    /// First direct child with the given ID.
    pub fn child(&self, id: ElementId) -> Option<&EbmlElement> {
        self.children().iter().find(|c| c.id == id)
    }

    /// Value of the first direct unsigned integer child with the given ID.
    pub fn child_uint(&self, id: ElementId) -> Option<u64> {
        self.child(id).and_then(EbmlElement::as_uint)
    }

    /// Unsigned integer payload.
    pub fn as_uint(&self) -> Option<u64> {
        match self.value {
            ElementValue::UInt(v) => Some(v),
            _ => None,
        }
    }

    /// Signed integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            ElementValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Binary payload.
    pub fn as_binary(&self) -> Option<&Bytes> {
        match &self.value {
            ElementValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Whether the element is a master.
    pub fn is_master(&self) -> bool {
        matches!(self.value, ElementValue::Master(_))
    }

    /// Whether the element holds its schema default value.
    pub fn is_default(&self) -> bool {
        match (schema::default_value(self.id), &self.value) {
            (Some(DefaultValue::UInt(d)), ElementValue::UInt(v)) => d == *v,
            (Some(DefaultValue::Float(d)), ElementValue::Float(v)) => d == *v,
            _ => false,
        }
    }

    /// Encode this element so that it fills exactly `available` bytes.
    ///
    /// The size field length is shrunk as far as needed (starting from the
    /// current length), any remaining space is padded with a Void element, and
    /// a one-byte remainder, which a Void cannot fill, is absorbed by widening
    /// the size field instead. Returns `None` if the element cannot fit.
    pub fn encode_into_space(&self, available: u64) -> Result<Option<BytesMut>> {
        let data_size = self.data_size();
        let minimal = vint_length(data_size);
        let current = self.size_field_length().max(minimal);

        let candidates = (minimal..=current)
            .rev()
            .chain(current + 1..=crate::vint::MAX_VINT_LENGTH);

        for size_length in candidates {
            let total = self.id.encoded_len() as u64 + size_length as u64 + data_size;
            let Some(remainder) = available.checked_sub(total) else {
                continue;
            };
            if remainder == 1 {
                continue;
            }

            let mut element = self.clone();
            element.size_length = Some(size_length);

            let mut buf = BytesMut::with_capacity(available as usize);
            element.encode(&mut buf)?;
            if remainder > 0 {
                let void = EbmlElement::void(remainder)
                    .ok_or(Error::VintOverflow { value: remainder, length: 8 })?;
                void.encode(&mut buf)?;
            }
            return Ok(Some(buf));
        }

        Ok(None)
    }
}
