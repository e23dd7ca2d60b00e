//! mkvmux-core: Matroska muxer back end
//!
//! Turns a stream of demuxed, timestamped packets into Matroska clusters,
//! cues and a correctly versioned EBML head.
//!
//! # Modules
//!
//! - `packet` - Packets as handed over by packetizers
//! - `track` - Track registrations and statistics
//! - `lacing` - Xiph, EBML and fixed-size lacing
//! - `block` - SimpleBlock/BlockGroup construction with two-phase reference resolution
//! - `cluster` - Open and sealed clusters, block layout
//! - `cues` - Cue index builder
//! - `doc_version` - DocType version tracking and EBML head patching
//! - `seek` - Seek head collaborator
//! - `split` - Split points
//! - `chapters` - Automatic chapter generation
//! - `assembler` - Cluster assembler
//! - `output` - File output and rotation
//! - `session` - Mux session tying everything together
//! - `config` - Mux configuration

pub mod assembler;
pub mod block;
pub mod chapters;
pub mod cluster;
pub mod config;
pub mod cues;
pub mod doc_version;
pub mod error;
pub mod lacing;
pub mod output;
pub mod packet;
pub mod seek;
pub mod session;
pub mod split;
pub mod track;

pub use assembler::{ClusterAssembler, FlushReason, MuxContext};
pub use block::{BlockBlob, BlockBlobMode};
pub use chapters::{ChapterGeneration, ChapterSink, GeneratedChapters};
pub use config::MuxConfig;
pub use cues::{CueIndex, CuePoint};
pub use doc_version::{DocTypeVersionTracker, HeadUpdateResult};
pub use error::{Error, Result};
pub use output::{FileOutput, MemoryOutput, MuxOutput, SegmentSettings};
pub use packet::Packet;
pub use session::MuxSession;
pub use split::{PartRange, SplitKind, SplitPoint};
pub use track::{CueStrategy, TrackConfig, TrackType};
