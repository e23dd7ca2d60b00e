//! Mux session.
//!
//! A [`MuxSession`] owns everything one mux run needs: the track registry,
//! the cue index, the DocType version tracker, the seek entries, the chapter
//! sink, the output and the assembler. Nothing is global; two sessions can
//! run side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::assembler::{ClusterAssembler, MuxContext};
use crate::chapters::{ChapterSink, GeneratedChapters};
use crate::config::MuxConfig;
use crate::cues::CueIndex;
use crate::doc_version::{DocTypeVersionTracker, HeadUpdateResult};
use crate::output::MuxOutput;
use crate::packet::Packet;
use crate::seek::SeekEntries;
use crate::track::{TrackConfig, TrackRegistry};
use crate::{Error, Result};

/// One mux run.
pub struct MuxSession<O: MuxOutput, C: ChapterSink = GeneratedChapters> {
    tracks: TrackRegistry,
    cues: CueIndex,
    versions: DocTypeVersionTracker,
    seek: SeekEntries,
    chapters: C,
    output: O,
    assembler: ClusterAssembler,
    abort: Arc<AtomicBool>,
    packets: u64,
    finished: bool,
}

impl<O: MuxOutput> MuxSession<O, GeneratedChapters> {
    /// Create a session collecting generated chapters in memory.
    pub fn new(config: MuxConfig, output: O) -> Result<Self> {
        Self::with_chapter_sink(config, output, GeneratedChapters::new())
    }
}

impl<O: MuxOutput, C: ChapterSink> MuxSession<O, C> {
    pub fn with_chapter_sink(config: MuxConfig, output: O, chapters: C) -> Result<Self> {
        config.validate()?;

        let mut cues = CueIndex::new(config.scale())
            .with_optional_fields(config.cues.durations, config.cues.relative_positions);
        cues.configure_for_version_limit(config.version_limit);

        Ok(Self {
            tracks: TrackRegistry::new(),
            cues,
            versions: DocTypeVersionTracker::new().with_version_limit(config.version_limit),
            seek: SeekEntries::new(),
            chapters,
            output,
            assembler: ClusterAssembler::new(config),
            abort: Arc::new(AtomicBool::new(false)),
            packets: 0,
            finished: false,
        })
    }

    /// Register an output track. Only allowed before the first packet.
    pub fn register_track(&mut self, config: TrackConfig) -> Result<()> {
        if self.assembler.has_started() {
            return Err(Error::config(format!(
                "track {} registered after muxing started",
                config.number
            )));
        }
        self.tracks.register(config)
    }

    /// Flag that stops the session before the next packet once set.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Hand one packet to the assembler.
    pub fn add_packet(&mut self, packet: Packet) -> Result<()> {
        if self.abort.load(Ordering::Relaxed) {
            tracing::warn!(packets = self.packets, "Mux aborted");
            return Err(Error::Aborted);
        }
        if self.finished {
            return Err(Error::invariant("packet added after finish"));
        }
        if !self.tracks.contains(packet.track) {
            return Err(Error::UnknownTrack(packet.track));
        }
        if self.packets == 0 && self.assembler.config().splits_by_frames() && !self.tracks.has_video() {
            return Err(Error::config(
                "splitting by frame/field numbers needs a video track",
            ));
        }

        self.packets += 1;
        let mut ctx = MuxContext {
            tracks: &mut self.tracks,
            cues: &mut self.cues,
            versions: &mut self.versions,
            output: &mut self.output,
            seek: &mut self.seek,
            chapters: &mut self.chapters,
        };
        self.assembler.add_packet(packet, &mut ctx)
    }

    /// Flush everything and finish the last file.
    pub fn finish(&mut self) -> Result<HeadUpdateResult> {
        if self.finished {
            return Err(Error::invariant("session finished twice"));
        }
        self.finished = true;

        let mut ctx = MuxContext {
            tracks: &mut self.tracks,
            cues: &mut self.cues,
            versions: &mut self.versions,
            output: &mut self.output,
            seek: &mut self.seek,
            chapters: &mut self.chapters,
        };
        let result = self.assembler.finish(&mut ctx)?;

        tracing::info!(
            packets = self.packets,
            clusters = self.assembler.clusters_written(),
            files = self.assembler.files_started(),
            version = self.versions.version(),
            read_version = self.versions.read_version(),
            "Mux finished"
        );
        Ok(result)
    }

    /// Already written content starting at `old_position` moved by `delta`
    /// bytes; shift the cue positions pointing into it.
    pub fn content_moved(&mut self, old_position: u64, delta: i64) {
        tracing::debug!(old_position, delta, "Content moved");
        self.cues.adjust_positions(old_position, delta);
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }

    pub fn cues(&self) -> &CueIndex {
        &self.cues
    }

    pub fn versions(&self) -> &DocTypeVersionTracker {
        &self.versions
    }

    pub fn chapters(&self) -> &C {
        &self.chapters
    }

    pub fn assembler(&self) -> &ClusterAssembler {
        &self.assembler
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn into_output(self) -> O {
        self.output
    }
}
