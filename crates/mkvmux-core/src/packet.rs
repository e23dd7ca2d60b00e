//! Demuxed packets as handed to the assembler.

use bytes::Bytes;

/// One BlockAdditions payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAddition {
    /// BlockAddID; 1 is the default.
    pub id: u64,
    pub data: Bytes,
}

/// A timestamped packet of one track.
///
/// All timestamps are absolute and in nanoseconds. References are absolute
/// timestamps of the frames this one depends on; the assembler converts them
/// to cluster-relative deltas once the cluster is sealed.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub track: u64,
    pub timestamp: i64,
    pub duration: Option<i64>,
    /// The duration must be written even if it matches the default duration.
    pub duration_mandatory: bool,
    /// Backward reference.
    pub bref: Option<i64>,
    /// Forward reference.
    pub fref: Option<i64>,
    /// Explicit key flag; derived from the references when absent.
    pub key_flag: Option<bool>,
    /// Explicit discardable flag; derived from the references when absent.
    pub discardable_flag: Option<bool>,
    pub codec_state: Option<Bytes>,
    pub block_additions: Vec<BlockAddition>,
    /// Discard padding in nanoseconds.
    pub discard_padding: Option<i64>,
    /// The packet follows a gap in the timeline.
    pub follows_gap: bool,
    pub reference_priority: u64,
    /// Index of the source file this packet came from.
    pub source_file: usize,
    pub data: Bytes,
}

impl Packet {
    pub fn new(track: u64, timestamp: i64, data: impl Into<Bytes>) -> Self {
        Self {
            track,
            timestamp,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_bref(mut self, bref: i64) -> Self {
        self.bref = Some(bref);
        self
    }

    pub fn with_fref(mut self, fref: i64) -> Self {
        self.fref = Some(fref);
        self
    }

    pub fn with_key_flag(mut self, key: bool) -> Self {
        self.key_flag = Some(key);
        self
    }

    pub fn with_codec_state(mut self, state: impl Into<Bytes>) -> Self {
        self.codec_state = Some(state.into());
        self
    }

    pub fn with_discard_padding(mut self, padding: i64) -> Self {
        self.discard_padding = Some(padding);
        self
    }

    pub fn with_block_addition(mut self, id: u64, data: impl Into<Bytes>) -> Self {
        self.block_additions.push(BlockAddition {
            id,
            data: data.into(),
        });
        self
    }

    pub fn following_gap(mut self) -> Self {
        self.follows_gap = true;
        self
    }

    pub fn from_source(mut self, source_file: usize) -> Self {
        self.source_file = source_file;
        self
    }

    pub fn has_references(&self) -> bool {
        self.bref.is_some() || self.fref.is_some()
    }

    /// Key frame: explicit flag if given, otherwise "references nothing".
    pub fn is_key_frame(&self) -> bool {
        self.key_flag.unwrap_or(!self.has_references())
    }

    /// Exactly one reference.
    pub fn is_p_frame(&self) -> bool {
        self.bref.is_some() != self.fref.is_some()
    }

    /// Duration or zero.
    pub fn duration_or_zero(&self) -> i64 {
        self.duration.unwrap_or(0).max(0)
    }

    pub fn end_timestamp(&self) -> i64 {
        self.timestamp + self.duration_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_kinds() {
        let key = Packet::new(1, 0, vec![0u8; 4]);
        assert!(key.is_key_frame());
        assert!(!key.is_p_frame());

        let p = Packet::new(1, 40, vec![0u8; 4]).with_bref(0);
        assert!(!p.is_key_frame());
        assert!(p.is_p_frame());

        let b = Packet::new(1, 40, vec![0u8; 4]).with_bref(0).with_fref(80);
        assert!(!b.is_key_frame());
        assert!(!b.is_p_frame());

        let forced = Packet::new(1, 40, vec![0u8; 4]).with_bref(0).with_key_flag(true);
        assert!(forced.is_key_frame());
    }

    #[test]
    fn test_end_timestamp() {
        let packet = Packet::new(1, 100, Bytes::new()).with_duration(20);
        assert_eq!(packet.end_timestamp(), 120);
        assert_eq!(Packet::new(1, 100, Bytes::new()).end_timestamp(), 100);
    }
}
