//! Byte sinks elements are written to.

use std::io::{Seek, Write};

use bytes::BytesMut;

use crate::vint::write_vint;
use crate::{EbmlElement, ElementId, Result};

/// A positioned byte sink.
///
/// Anything that is `Write + Seek` is a sink; the position reported is the
/// absolute stream position the next byte lands at.
pub trait ElementSink {
    /// Current write position.
    fn position(&mut self) -> Result<u64>;

    /// Write raw bytes.
    fn write_body(&mut self, data: &[u8]) -> Result<()>;

    /// Write an element header (ID and size field) for a body written later.
    fn write_head(&mut self, id: ElementId, size: u64, size_length: usize) -> Result<()> {
        let mut buf = BytesMut::with_capacity(12);
        buf.extend_from_slice(&id.to_bytes());
        write_vint(&mut buf, size, size_length)?;
        self.write_body(&buf)
    }

    /// Write a complete element, returning the number of bytes written.
    fn write_element(&mut self, element: &EbmlElement) -> Result<u64> {
        let bytes = element.to_bytes()?;
        self.write_body(&bytes)?;
        Ok(bytes.len() as u64)
    }
}

impl<W: Write + Seek + ?Sized> ElementSink for W {
    fn position(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }

    fn write_body(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_cursor_sink_positions() {
        let mut cursor = Cursor::new(Vec::new());
        assert_eq!(cursor.position(), 0);

        cursor.write_head(ElementId::CUES, 3, 2).unwrap();
        assert_eq!(ElementSink::position(&mut cursor).unwrap(), 6);

        let written = cursor
            .write_element(&EbmlElement::uint(ElementId::CUE_TIME, 7))
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            cursor.into_inner(),
            vec![0x1C, 0x53, 0xBB, 0x6B, 0x40, 0x03, 0xB3, 0x81, 0x07]
        );
    }
}
