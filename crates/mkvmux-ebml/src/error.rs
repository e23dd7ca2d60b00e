//! Error types for mkvmux-ebml.

use std::io;
use thiserror::Error;

use crate::ElementId;

/// Result type for mkvmux-ebml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mkvmux-ebml operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Value does not fit into the requested varint length.
    #[error("Value {value} does not fit into a {length}-byte varint")]
    VintOverflow { value: u64, length: usize },

    /// Malformed varint or element ID in the input.
    #[error("Invalid varint at offset {offset}")]
    InvalidVint { offset: usize },

    /// Input ended before the element was complete.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// Element payload does not match its schema type.
    #[error("Invalid payload for element {id}: {reason}")]
    InvalidPayload { id: ElementId, reason: String },

    /// Element size exceeds what the reader accepts.
    #[error("Element {id} too large: {size} bytes")]
    ElementTooLarge { id: ElementId, size: u64 },
}

impl Error {
    /// Create an invalid payload error.
    pub fn invalid_payload(id: ElementId, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            id,
            reason: reason.into(),
        }
    }
}
