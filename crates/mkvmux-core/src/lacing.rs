//! Frame lacing.
//!
//! A laced block carries several frames of one track behind a single block
//! header. The lace header stores the frame count and the sizes of all but
//! the last frame; three encodings exist and the smallest one is picked.

use bytes::{BufMut, Bytes};
use mkvmux_ebml::vint::{
    decode_signed_vint, decode_vint, signed_vint_length, vint_length, write_signed_vint, write_vint,
};

use crate::{Error, Result};

/// Most frames packed into a single laced block.
pub const MAX_FRAMES_PER_LACE: usize = 8;

/// Lacing scheme of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    Fixed,
    Ebml,
}

impl Lacing {
    /// Lacing bits of the block flags byte.
    pub fn flag_bits(self) -> u8 {
        match self {
            Lacing::None => 0x00,
            Lacing::Xiph => 0x02,
            Lacing::Fixed => 0x04,
            Lacing::Ebml => 0x06,
        }
    }

    pub fn from_flags(flags: u8) -> Self {
        match flags & 0x06 {
            0x02 => Lacing::Xiph,
            0x04 => Lacing::Fixed,
            0x06 => Lacing::Ebml,
            _ => Lacing::None,
        }
    }

    /// Bytes the lace header takes for the given frame sizes.
    pub fn header_size(self, sizes: &[usize]) -> usize {
        match self {
            Lacing::None => 0,
            Lacing::Fixed => 1,
            Lacing::Xiph => {
                1 + sizes[..sizes.len().saturating_sub(1)]
                    .iter()
                    .map(|s| s / 255 + 1)
                    .sum::<usize>()
            }
            Lacing::Ebml => {
                if sizes.len() < 2 {
                    return 1;
                }
                let first = vint_length(sizes[0] as u64);
                let deltas: usize = sizes[..sizes.len() - 1]
                    .windows(2)
                    .map(|w| signed_vint_length(w[1] as i64 - w[0] as i64))
                    .sum();
                1 + first + deltas
            }
        }
    }
}

/// Pick the lacing scheme with the smallest header for `frames`.
pub fn choose_lacing(frames: &[Bytes]) -> Lacing {
    if frames.len() < 2 {
        return Lacing::None;
    }

    let sizes: Vec<usize> = frames.iter().map(Bytes::len).collect();
    if sizes.iter().all(|s| *s == sizes[0]) {
        return Lacing::Fixed;
    }

    if Lacing::Xiph.header_size(&sizes) <= Lacing::Ebml.header_size(&sizes) {
        Lacing::Xiph
    } else {
        Lacing::Ebml
    }
}

/// Write the lace header for `frames` using `lacing`.
pub fn write_lace_header<B: BufMut>(buf: &mut B, lacing: Lacing, frames: &[Bytes]) -> Result<()> {
    if lacing == Lacing::None {
        return Ok(());
    }
    if frames.is_empty() || frames.len() > 256 {
        return Err(Error::invariant(format!(
            "cannot lace {} frames",
            frames.len()
        )));
    }

    buf.put_u8((frames.len() - 1) as u8);
    let sizes: Vec<usize> = frames.iter().map(Bytes::len).collect();
    let leading = &sizes[..sizes.len() - 1];

    match lacing {
        Lacing::None | Lacing::Fixed => {}
        Lacing::Xiph => {
            for size in leading {
                let mut remaining = *size;
                while remaining >= 255 {
                    buf.put_u8(255);
                    remaining -= 255;
                }
                buf.put_u8(remaining as u8);
            }
        }
        Lacing::Ebml => {
            if let Some(first) = leading.first() {
                write_vint(buf, *first as u64, vint_length(*first as u64))?;
                for pair in leading.windows(2) {
                    write_signed_vint(buf, pair[1] as i64 - pair[0] as i64)?;
                }
            }
        }
    }

    Ok(())
}

/// Split the body of a laced block (everything after the flags byte) back
/// into frames.
pub fn decode_laced_frames(lacing: Lacing, data: &[u8]) -> Result<Vec<Bytes>> {
    if lacing == Lacing::None {
        return Ok(vec![Bytes::copy_from_slice(data)]);
    }

    let underflow = || Error::Ebml(mkvmux_ebml::Error::BufferUnderflow { need: 1, have: 0 });
    let count = usize::from(*data.first().ok_or_else(underflow)?) + 1;
    let mut pos = 1;
    let mut sizes = Vec::with_capacity(count);

    match lacing {
        Lacing::None => {}
        Lacing::Xiph => {
            for _ in 0..count - 1 {
                let mut size = 0usize;
                loop {
                    let byte = *data.get(pos).ok_or_else(underflow)?;
                    pos += 1;
                    size += usize::from(byte);
                    if byte != 255 {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        Lacing::Ebml => {
            if count > 1 {
                let (first, len) = decode_vint(&data[pos..])?;
                let first = first.ok_or_else(|| Error::invariant("unknown size in EBML lace"))?;
                pos += len;
                sizes.push(first as usize);
                for _ in 0..count - 2 {
                    let (delta, len) = decode_signed_vint(&data[pos..])?;
                    pos += len;
                    let previous = sizes.last().copied().unwrap_or_default() as i64;
                    sizes.push((previous + delta) as usize);
                }
            }
        }
        Lacing::Fixed => {
            let total = data.len() - pos;
            if total % count != 0 {
                return Err(Error::invariant(format!(
                    "fixed lace of {count} frames over {total} bytes"
                )));
            }
            sizes.resize(count - 1, total / count);
        }
    }

    let leading: usize = sizes.iter().sum();
    let remaining = data.len().checked_sub(pos + leading).ok_or_else(underflow)?;
    sizes.push(remaining);

    let mut frames = Vec::with_capacity(count);
    for size in sizes {
        frames.push(Bytes::copy_from_slice(&data[pos..pos + size]));
        pos += size;
    }
    Ok(frames)
}
