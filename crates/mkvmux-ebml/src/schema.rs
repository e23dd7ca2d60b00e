//! Payload types and default values for the known element IDs.

use crate::ElementId;

/// Payload type of an element, as needed to decode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Master,
    UInt,
    Int,
    Float,
    String,
    Binary,
    Date,
}

/// Schema default of an element, used to skip default values in accounting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    UInt(u64),
    Float(f64),
}

/// Look up the payload type of `id`. Unknown IDs return `None`.
pub fn element_type(id: ElementId) -> Option<ElementType> {
    use ElementType::*;

    let ty = match id {
        ElementId::EBML
        | ElementId::SEGMENT
        | ElementId::SEEK_HEAD
        | ElementId::SEEK
        | ElementId::INFO
        | ElementId::TRACKS
        | ElementId::TRACK_ENTRY
        | ElementId::BLOCK_ADDITION_MAPPING
        | ElementId::TRACK_OPERATION
        | ElementId::VIDEO
        | ElementId::COLOUR
        | ElementId::PROJECTION
        | ElementId::AUDIO
        | ElementId::CLUSTER
        | ElementId::BLOCK_GROUP
        | ElementId::BLOCK_ADDITIONS
        | ElementId::BLOCK_MORE
        | ElementId::CUES
        | ElementId::CUE_POINT
        | ElementId::CUE_TRACK_POSITIONS
        | ElementId::CHAPTERS
        | ElementId::EDITION_ENTRY
        | ElementId::EDITION_DISPLAY
        | ElementId::CHAPTER_ATOM => Master,

        ElementId::EBML_VERSION
        | ElementId::EBML_READ_VERSION
        | ElementId::EBML_MAX_ID_LENGTH
        | ElementId::EBML_MAX_SIZE_LENGTH
        | ElementId::DOC_TYPE_VERSION
        | ElementId::DOC_TYPE_READ_VERSION
        | ElementId::SEEK_POSITION
        | ElementId::TIMESTAMP_SCALE
        | ElementId::TRACK_NUMBER
        | ElementId::TRACK_UID
        | ElementId::TRACK_TYPE
        | ElementId::FLAG_LACING
        | ElementId::FLAG_DEFAULT
        | ElementId::FLAG_FORCED
        | ElementId::FLAG_HEARING_IMPAIRED
        | ElementId::FLAG_VISUAL_IMPAIRED
        | ElementId::FLAG_TEXT_DESCRIPTIONS
        | ElementId::FLAG_ORIGINAL
        | ElementId::FLAG_COMMENTARY
        | ElementId::DEFAULT_DURATION
        | ElementId::MAX_BLOCK_ADDITION_ID
        | ElementId::CODEC_DELAY
        | ElementId::SEEK_PRE_ROLL
        | ElementId::BLOCK_ADD_ID_VALUE
        | ElementId::BLOCK_ADD_ID_TYPE
        | ElementId::PIXEL_WIDTH
        | ElementId::PIXEL_HEIGHT
        | ElementId::STEREO_MODE
        | ElementId::ALPHA_MODE
        | ElementId::CHANNELS
        | ElementId::CLUSTER_TIMESTAMP
        | ElementId::CLUSTER_POSITION
        | ElementId::CLUSTER_PREV_SIZE
        | ElementId::BLOCK_ADD_ID
        | ElementId::BLOCK_DURATION
        | ElementId::REFERENCE_PRIORITY
        | ElementId::CUE_TIME
        | ElementId::CUE_TRACK
        | ElementId::CUE_CLUSTER_POSITION
        | ElementId::CUE_RELATIVE_POSITION
        | ElementId::CUE_DURATION
        | ElementId::CUE_BLOCK_NUMBER
        | ElementId::CUE_CODEC_STATE
        | ElementId::CHAPTER_SKIP_TYPE => UInt,

        ElementId::REFERENCE_BLOCK | ElementId::DISCARD_PADDING => Int,

        ElementId::DURATION | ElementId::SAMPLING_FREQUENCY => Float,

        ElementId::DOC_TYPE
        | ElementId::MUXING_APP
        | ElementId::WRITING_APP
        | ElementId::NAME
        | ElementId::LANGUAGE
        | ElementId::LANGUAGE_BCP47
        | ElementId::CODEC_ID
        | ElementId::BLOCK_ADD_ID_NAME
        | ElementId::EDITION_STRING
        | ElementId::EDITION_LANGUAGE_IETF
        | ElementId::CHAP_LANGUAGE_BCP47
        | ElementId::TAG_LANGUAGE_BCP47 => String,

        ElementId::DATE_UTC => Date,

        ElementId::VOID
        | ElementId::CRC32
        | ElementId::SEEK_ID
        | ElementId::CODEC_PRIVATE
        | ElementId::BLOCK_ADD_ID_EXTRA_DATA
        | ElementId::SIMPLE_BLOCK
        | ElementId::BLOCK
        | ElementId::BLOCK_ADDITIONAL
        | ElementId::CODEC_STATE => Binary,

        _ => return None,
    };

    Some(ty)
}

/// Schema default value of `id`, if it has one.
pub fn default_value(id: ElementId) -> Option<DefaultValue> {
    use DefaultValue::*;

    let value = match id {
        ElementId::EBML_VERSION
        | ElementId::EBML_READ_VERSION
        | ElementId::DOC_TYPE_VERSION
        | ElementId::DOC_TYPE_READ_VERSION
        | ElementId::FLAG_LACING
        | ElementId::FLAG_DEFAULT
        | ElementId::BLOCK_ADD_ID
        | ElementId::CHANNELS => UInt(1),
        ElementId::EBML_MAX_ID_LENGTH => UInt(4),
        ElementId::EBML_MAX_SIZE_LENGTH => UInt(8),
        ElementId::TIMESTAMP_SCALE => UInt(1_000_000),
        ElementId::FLAG_FORCED
        | ElementId::FLAG_HEARING_IMPAIRED
        | ElementId::FLAG_VISUAL_IMPAIRED
        | ElementId::FLAG_TEXT_DESCRIPTIONS
        | ElementId::FLAG_ORIGINAL
        | ElementId::FLAG_COMMENTARY
        | ElementId::MAX_BLOCK_ADDITION_ID
        | ElementId::CODEC_DELAY
        | ElementId::SEEK_PRE_ROLL
        | ElementId::STEREO_MODE
        | ElementId::ALPHA_MODE
        | ElementId::REFERENCE_PRIORITY
        | ElementId::CHAPTER_SKIP_TYPE => UInt(0),
        ElementId::SAMPLING_FREQUENCY => Float(8000.0),
        _ => return None,
    };

    Some(value)
}

/// Whether `id` is a master element.
pub fn is_master(id: ElementId) -> bool {
    element_type(id) == Some(ElementType::Master)
}
