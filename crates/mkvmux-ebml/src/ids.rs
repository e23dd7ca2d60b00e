//! Matroska element IDs.
//!
//! Only the subset of the schema touched by muxing is listed here: the EBML
//! head, the segment level headers needed to describe a file, clusters and
//! their blocks, cues, and the few chapter/track elements whose presence
//! raises the DocType version.

/// An EBML element ID, stored with its length marker bits (as written on disk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    // EBML header
    pub const EBML: Self = Self(0x1A45_DFA3);
    pub const EBML_VERSION: Self = Self(0x4286);
    pub const EBML_READ_VERSION: Self = Self(0x42F7);
    pub const EBML_MAX_ID_LENGTH: Self = Self(0x42F2);
    pub const EBML_MAX_SIZE_LENGTH: Self = Self(0x42F3);
    pub const DOC_TYPE: Self = Self(0x4282);
    pub const DOC_TYPE_VERSION: Self = Self(0x4287);
    pub const DOC_TYPE_READ_VERSION: Self = Self(0x4285);
    pub const VOID: Self = Self(0xEC);
    pub const CRC32: Self = Self(0xBF);

    // Segment and meta seek
    pub const SEGMENT: Self = Self(0x1853_8067);
    pub const SEEK_HEAD: Self = Self(0x114D_9B74);
    pub const SEEK: Self = Self(0x4DBB);
    pub const SEEK_ID: Self = Self(0x53AB);
    pub const SEEK_POSITION: Self = Self(0x53AC);

    // Segment information
    pub const INFO: Self = Self(0x1549_A966);
    pub const TIMESTAMP_SCALE: Self = Self(0x2A_D7B1);
    pub const DURATION: Self = Self(0x4489);
    pub const MUXING_APP: Self = Self(0x4D80);
    pub const WRITING_APP: Self = Self(0x5741);
    pub const DATE_UTC: Self = Self(0x4461);

    // Tracks
    pub const TRACKS: Self = Self(0x1654_AE6B);
    pub const TRACK_ENTRY: Self = Self(0xAE);
    pub const TRACK_NUMBER: Self = Self(0xD7);
    pub const TRACK_UID: Self = Self(0x73C5);
    pub const TRACK_TYPE: Self = Self(0x83);
    pub const FLAG_LACING: Self = Self(0x9C);
    pub const FLAG_DEFAULT: Self = Self(0x88);
    pub const FLAG_FORCED: Self = Self(0x55AA);
    pub const FLAG_HEARING_IMPAIRED: Self = Self(0x55AB);
    pub const FLAG_VISUAL_IMPAIRED: Self = Self(0x55AC);
    pub const FLAG_TEXT_DESCRIPTIONS: Self = Self(0x55AD);
    pub const FLAG_ORIGINAL: Self = Self(0x55AE);
    pub const FLAG_COMMENTARY: Self = Self(0x55AF);
    pub const DEFAULT_DURATION: Self = Self(0x23_E383);
    pub const MAX_BLOCK_ADDITION_ID: Self = Self(0x55EE);
    pub const NAME: Self = Self(0x536E);
    pub const LANGUAGE: Self = Self(0x22_B59C);
    pub const LANGUAGE_BCP47: Self = Self(0x22_B59D);
    pub const CODEC_ID: Self = Self(0x86);
    pub const CODEC_PRIVATE: Self = Self(0x63A2);
    pub const CODEC_DELAY: Self = Self(0x56AA);
    pub const SEEK_PRE_ROLL: Self = Self(0x56BB);
    pub const BLOCK_ADDITION_MAPPING: Self = Self(0x41E4);
    pub const BLOCK_ADD_ID_VALUE: Self = Self(0x41F0);
    pub const BLOCK_ADD_ID_NAME: Self = Self(0x41A4);
    pub const BLOCK_ADD_ID_TYPE: Self = Self(0x41E7);
    pub const BLOCK_ADD_ID_EXTRA_DATA: Self = Self(0x41ED);
    pub const TRACK_OPERATION: Self = Self(0xE2);
    pub const VIDEO: Self = Self(0xE0);
    pub const PIXEL_WIDTH: Self = Self(0xB0);
    pub const PIXEL_HEIGHT: Self = Self(0xBA);
    pub const STEREO_MODE: Self = Self(0x53B8);
    pub const ALPHA_MODE: Self = Self(0x53C0);
    pub const COLOUR: Self = Self(0x55B0);
    pub const PROJECTION: Self = Self(0x7670);
    pub const AUDIO: Self = Self(0xE1);
    pub const SAMPLING_FREQUENCY: Self = Self(0xB5);
    pub const CHANNELS: Self = Self(0x9F);

    // Cluster
    pub const CLUSTER: Self = Self(0x1F43_B675);
    pub const CLUSTER_TIMESTAMP: Self = Self(0xE7);
    pub const CLUSTER_POSITION: Self = Self(0xA7);
    pub const CLUSTER_PREV_SIZE: Self = Self(0xAB);
    pub const SIMPLE_BLOCK: Self = Self(0xA3);
    pub const BLOCK_GROUP: Self = Self(0xA0);
    pub const BLOCK: Self = Self(0xA1);
    pub const BLOCK_ADDITIONS: Self = Self(0x75A1);
    pub const BLOCK_MORE: Self = Self(0xA6);
    pub const BLOCK_ADD_ID: Self = Self(0xEE);
    pub const BLOCK_ADDITIONAL: Self = Self(0xA5);
    pub const BLOCK_DURATION: Self = Self(0x9B);
    pub const REFERENCE_PRIORITY: Self = Self(0xFA);
    pub const REFERENCE_BLOCK: Self = Self(0xFB);
    pub const CODEC_STATE: Self = Self(0xA4);
    pub const DISCARD_PADDING: Self = Self(0x75A2);

    // Cues
    pub const CUES: Self = Self(0x1C53_BB6B);
    pub const CUE_POINT: Self = Self(0xBB);
    pub const CUE_TIME: Self = Self(0xB3);
    pub const CUE_TRACK_POSITIONS: Self = Self(0xB7);
    pub const CUE_TRACK: Self = Self(0xF7);
    pub const CUE_CLUSTER_POSITION: Self = Self(0xF1);
    pub const CUE_RELATIVE_POSITION: Self = Self(0xF0);
    pub const CUE_DURATION: Self = Self(0xB2);
    pub const CUE_BLOCK_NUMBER: Self = Self(0x5378);
    pub const CUE_CODEC_STATE: Self = Self(0xEA);

    // Chapters
    pub const CHAPTERS: Self = Self(0x1043_A770);
    pub const EDITION_ENTRY: Self = Self(0x45B9);
    pub const EDITION_DISPLAY: Self = Self(0x4520);
    pub const EDITION_STRING: Self = Self(0x4521);
    pub const EDITION_LANGUAGE_IETF: Self = Self(0x45E4);
    pub const CHAPTER_ATOM: Self = Self(0xB6);
    pub const CHAPTER_SKIP_TYPE: Self = Self(0x4588);
    pub const CHAP_LANGUAGE_BCP47: Self = Self(0x437D);

    // Tags
    pub const TAG_LANGUAGE_BCP47: Self = Self(0x447B);

    /// Number of bytes this ID occupies when written.
    pub fn encoded_len(self) -> usize {
        match self.0 {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            0x1_0000..=0xFF_FFFF => 3,
            _ => 4,
        }
    }

    /// The on-disk bytes of this ID.
    pub fn to_bytes(self) -> Vec<u8> {
        let len = self.encoded_len();
        self.0.to_be_bytes()[4 - len..].to_vec()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}
