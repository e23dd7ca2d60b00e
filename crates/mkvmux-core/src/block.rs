//! Blocks.
//!
//! A [`BlockBlob`] is one SimpleBlock or BlockGroup under construction. It
//! keeps every timestamp absolute while the cluster is still open; the block's
//! relative timestamp and its ReferenceBlock deltas are only computed by
//! [`BlockBlob::resolve`], once the cluster's base timestamp is fixed.

use bytes::{BufMut, Bytes, BytesMut};
use mkvmux_ebml::vint::{decode_vint, vint_length, write_vint};
use mkvmux_ebml::{EbmlElement, ElementId};

use crate::lacing::{
    choose_lacing, decode_laced_frames, write_lace_header, Lacing, MAX_FRAMES_PER_LACE,
};
use crate::packet::BlockAddition;
use crate::{Error, Result};

const FLAG_KEY_FRAME: u8 = 0x80;
const FLAG_INVISIBLE: u8 = 0x08;
const FLAG_DISCARDABLE: u8 = 0x01;

/// Whether SimpleBlocks may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum BlockBlobMode {
    /// SimpleBlock for everything; references only affect the flags.
    AlwaysSimple,
    /// SimpleBlock unless a BlockGroup is needed.
    #[default]
    SimpleAuto,
    /// BlockGroup for everything.
    NoSimple,
}

/// A ReferenceBlock holding an absolute target until it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceBlock {
    target: i64,
    delta: Option<i64>,
}

impl ReferenceBlock {
    pub fn new(target: i64) -> Self {
        Self {
            target,
            delta: None,
        }
    }

    /// Absolute timestamp of the referenced frame.
    pub fn target(&self) -> i64 {
        self.target
    }

    /// Delta in timestamp-scale units relative to the owning block.
    pub fn delta(&self) -> Option<i64> {
        self.delta
    }

    fn resolve(&mut self, block_timestamp: i64, scale: i64) -> Result<()> {
        if self.delta.is_some() {
            return Err(Error::invariant(format!(
                "reference to {} resolved twice",
                self.target
            )));
        }
        self.delta = Some(self.target.div_euclid(scale) - block_timestamp.div_euclid(scale));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlobKind {
    Simple,
    Group,
}

/// A SimpleBlock or BlockGroup.
#[derive(Debug, Clone)]
pub struct BlockBlob {
    kind: BlobKind,
    mode: BlockBlobMode,
    track: u64,
    timestamp: i64,
    frames: Vec<Bytes>,
    references: Vec<ReferenceBlock>,
    key_flag: Option<bool>,
    discardable_flag: Option<bool>,
    auto_discardable: bool,
    duration: Option<i64>,
    reference_priority: u64,
    additions: Vec<BlockAddition>,
    codec_state: Option<Bytes>,
    discard_padding: Option<i64>,
    scale: i64,
    relative_timestamp: Option<i16>,
}

impl BlockBlob {
    pub fn new(track: u64, mode: BlockBlobMode) -> Self {
        Self {
            kind: if mode == BlockBlobMode::NoSimple {
                BlobKind::Group
            } else {
                BlobKind::Simple
            },
            mode,
            track,
            timestamp: 0,
            frames: Vec::new(),
            references: Vec::new(),
            key_flag: None,
            discardable_flag: None,
            auto_discardable: false,
            duration: None,
            reference_priority: 0,
            additions: Vec::new(),
            codec_state: None,
            discard_padding: None,
            scale: 1,
            relative_timestamp: None,
        }
    }

    /// Turn a SimpleBlock into a BlockGroup.
    ///
    /// Only possible before any frame has been added and not in
    /// [`BlockBlobMode::AlwaysSimple`]. Returns whether the blob is a group.
    pub fn replace_simple_by_group(&mut self) -> bool {
        match self.kind {
            BlobKind::Group => true,
            BlobKind::Simple if self.mode == BlockBlobMode::AlwaysSimple => false,
            BlobKind::Simple if !self.frames.is_empty() => false,
            BlobKind::Simple => {
                self.kind = BlobKind::Group;
                true
            }
        }
    }

    /// Add a frame, choosing the block type from its references.
    ///
    /// The first frame fixes the block timestamp. Returns whether further
    /// frames may be laced into this block.
    pub fn add_frame_auto(
        &mut self,
        timestamp: i64,
        data: Bytes,
        bref: Option<i64>,
        fref: Option<i64>,
        lacing: bool,
    ) -> bool {
        let has_refs = bref.is_some() || fref.is_some();
        if self.mode == BlockBlobMode::SimpleAuto && has_refs {
            self.replace_simple_by_group();
        }

        if self.frames.is_empty() {
            self.timestamp = timestamp;
        }
        self.frames.push(data);

        if has_refs {
            self.references
                .extend(bref.into_iter().chain(fref).map(ReferenceBlock::new));
            let settles = |r: Option<i64>| r.map_or(true, |t| t <= timestamp);
            self.auto_discardable = !(settles(bref) && settles(fref));
        }

        lacing && self.frames.len() < MAX_FRAMES_PER_LACE && self.references.is_empty()
    }

    /// Override the key flag derived from the references.
    pub fn set_key_flag(&mut self, key: bool) {
        self.key_flag = Some(key);
    }

    /// Override the discardable flag derived from the references.
    pub fn set_discardable_flag(&mut self, discardable: bool) {
        self.discardable_flag = Some(discardable);
    }

    /// Set the BlockDuration in nanoseconds. Only BlockGroups carry one.
    pub fn set_block_duration(&mut self, duration: i64) -> Result<()> {
        self.require_group("BlockDuration")?;
        self.duration = Some(duration);
        Ok(())
    }

    pub fn set_reference_priority(&mut self, priority: u64) -> Result<()> {
        if priority > 0 {
            self.require_group("ReferencePriority")?;
        }
        self.reference_priority = priority;
        Ok(())
    }

    pub fn add_block_addition(&mut self, addition: BlockAddition) -> Result<()> {
        self.require_group("BlockAdditions")?;
        self.additions.push(addition);
        Ok(())
    }

    pub fn set_codec_state(&mut self, state: Bytes) -> Result<()> {
        self.require_group("CodecState")?;
        self.codec_state = Some(state);
        Ok(())
    }

    /// Set the DiscardPadding in nanoseconds.
    pub fn set_discard_padding(&mut self, padding: i64) -> Result<()> {
        self.require_group("DiscardPadding")?;
        self.discard_padding = Some(padding);
        Ok(())
    }

    fn require_group(&self, what: &str) -> Result<()> {
        match self.kind {
            BlobKind::Group => Ok(()),
            BlobKind::Simple => Err(Error::invariant(format!("{what} needs a BlockGroup"))),
        }
    }

    pub fn track(&self) -> u64 {
        self.track
    }

    /// Absolute timestamp of the first frame.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn is_simple(&self) -> bool {
        self.kind == BlobKind::Simple
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// Total payload bytes of all frames.
    pub fn data_size(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    pub fn references(&self) -> &[ReferenceBlock] {
        &self.references
    }

    pub fn duration(&self) -> Option<i64> {
        self.duration
    }

    pub fn codec_state(&self) -> Option<&Bytes> {
        self.codec_state.as_ref()
    }

    pub fn is_key_frame(&self) -> bool {
        self.key_flag.unwrap_or(self.references.is_empty())
    }

    pub fn is_discardable(&self) -> bool {
        self.discardable_flag.unwrap_or(self.auto_discardable)
    }

    /// Block timestamp relative to the cluster, set by [`Self::resolve`].
    pub fn relative_timestamp(&self) -> Option<i16> {
        self.relative_timestamp
    }

    pub fn is_resolved(&self) -> bool {
        self.relative_timestamp.is_some()
    }

    /// Fix the block relative to `cluster_base` (in timestamp-scale units)
    /// and turn every reference into a delta relative to this block.
    pub fn resolve(&mut self, cluster_base: i64, scale: i64) -> Result<()> {
        if self.relative_timestamp.is_some() {
            return Err(Error::invariant(format!(
                "block of track {} at {} resolved twice",
                self.track, self.timestamp
            )));
        }

        let relative = self.timestamp.div_euclid(scale) - cluster_base;
        let relative = i16::try_from(relative).map_err(|_| {
            Error::invariant(format!(
                "block timestamp {} is {relative} units away from cluster base {cluster_base}",
                self.timestamp
            ))
        })?;

        for reference in &mut self.references {
            reference.resolve(self.timestamp, scale)?;
        }

        self.scale = scale;
        self.relative_timestamp = Some(relative);
        Ok(())
    }

    fn block_body(&self, relative: i16, flags: u8) -> Result<Bytes> {
        let lacing = if self.frames.len() > 1 {
            choose_lacing(&self.frames)
        } else {
            Lacing::None
        };

        let mut buf = BytesMut::with_capacity(self.data_size() + 16);
        write_vint(&mut buf, self.track, vint_length(self.track))?;
        buf.put_i16(relative);
        buf.put_u8(flags | lacing.flag_bits());
        write_lace_header(&mut buf, lacing, &self.frames)?;
        for frame in &self.frames {
            buf.put_slice(frame);
        }
        Ok(buf.freeze())
    }

    /// Build the element. Fails if the blob was never resolved.
    pub fn to_element(&self) -> Result<EbmlElement> {
        let relative = self.relative_timestamp.ok_or_else(|| {
            Error::invariant(format!(
                "block of track {} at {} serialized before resolution",
                self.track, self.timestamp
            ))
        })?;
        if self.frames.is_empty() {
            return Err(Error::invariant("block without frames"));
        }

        if self.kind == BlobKind::Simple {
            let mut flags = 0;
            if self.is_key_frame() {
                flags |= FLAG_KEY_FRAME;
            }
            if self.is_discardable() {
                flags |= FLAG_DISCARDABLE;
            }
            return Ok(EbmlElement::binary(
                ElementId::SIMPLE_BLOCK,
                self.block_body(relative, flags)?,
            ));
        }

        let mut children = vec![EbmlElement::binary(
            ElementId::BLOCK,
            self.block_body(relative, 0)?,
        )];

        if !self.additions.is_empty() {
            let more = self
                .additions
                .iter()
                .map(|addition| {
                    let mut more = Vec::with_capacity(2);
                    if addition.id != 1 {
                        more.push(EbmlElement::uint(ElementId::BLOCK_ADD_ID, addition.id));
                    }
                    more.push(EbmlElement::binary(
                        ElementId::BLOCK_ADDITIONAL,
                        addition.data.clone(),
                    ));
                    EbmlElement::master(ElementId::BLOCK_MORE, more)
                })
                .collect();
            children.push(EbmlElement::master(ElementId::BLOCK_ADDITIONS, more));
        }

        if let Some(duration) = self.duration {
            let units = (duration + self.scale / 2) / self.scale;
            children.push(EbmlElement::uint(ElementId::BLOCK_DURATION, units.max(0) as u64));
        }
        if self.reference_priority > 0 {
            children.push(EbmlElement::uint(
                ElementId::REFERENCE_PRIORITY,
                self.reference_priority,
            ));
        }
        for reference in &self.references {
            let delta = reference.delta().ok_or_else(|| {
                Error::invariant(format!("reference to {} never resolved", reference.target()))
            })?;
            children.push(EbmlElement::int(ElementId::REFERENCE_BLOCK, delta));
        }
        if let Some(state) = &self.codec_state {
            children.push(EbmlElement::binary(ElementId::CODEC_STATE, state.clone()));
        }
        if let Some(padding) = self.discard_padding {
            children.push(EbmlElement::int(ElementId::DISCARD_PADDING, padding));
        }

        Ok(EbmlElement::master(ElementId::BLOCK_GROUP, children))
    }
}

/// A block decoded from its on-disk payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub track: u64,
    pub relative_timestamp: i16,
    pub key_frame: bool,
    pub invisible: bool,
    pub discardable: bool,
    pub lacing: Lacing,
    pub frames: Vec<Bytes>,
}

/// Decode the payload of a SimpleBlock or Block element.
///
/// The key and discardable bits are only meaningful for SimpleBlocks.
pub fn decode_block(data: &[u8]) -> Result<DecodedBlock> {
    let (track, track_len) = decode_vint(data)?;
    let track = track.ok_or_else(|| Error::invariant("block without track number"))?;
    let header_len = track_len + 3;
    if data.len() < header_len {
        return Err(Error::Ebml(mkvmux_ebml::Error::BufferUnderflow {
            need: header_len,
            have: data.len(),
        }));
    }

    let relative_timestamp = i16::from_be_bytes([data[track_len], data[track_len + 1]]);
    let flags = data[track_len + 2];
    let lacing = Lacing::from_flags(flags);

    Ok(DecodedBlock {
        track,
        relative_timestamp,
        key_frame: flags & FLAG_KEY_FRAME != 0,
        invisible: flags & FLAG_INVISIBLE != 0,
        discardable: flags & FLAG_DISCARDABLE != 0,
        lacing,
        frames: decode_laced_frames(lacing, &data[header_len..])?,
    })
}
