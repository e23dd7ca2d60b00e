//! Cluster assembler.
//!
//! Packets arrive one at a time through [`ClusterAssembler::add_packet`].
//! They are queued in the open cluster until one of the cluster limits is
//! hit, the block timestamps would no longer fit the 16-bit delta, or a
//! split point is reached. Rendering the cluster (see `render.rs`) turns the
//! queued packets into laced blocks, resolves their references and writes
//! the cluster.
//!
//! Per cluster the assembler moves through EMPTY, ACCUMULATING and FLUSHING;
//! a split that opens a new file passes through a file boundary between
//! FLUSHING and the next EMPTY.

mod render;

use crate::chapters::{format_chapter_name, ChapterGeneration, ChapterSink};
use crate::config::MuxConfig;
use crate::cues::CueIndex;
use crate::doc_version::{DocTypeVersionTracker, HeadUpdateResult};
use crate::output::MuxOutput;
use crate::packet::Packet;
use crate::seek::SeekIndex;
use crate::split::{SplitKind, SplitPoint};
use crate::track::TrackRegistry;
use crate::Result;

/// Fixed per-cluster overhead used by the size estimate.
const CLUSTER_OVERHEAD_ESTIMATE: u64 = 21;
/// Per-cue overhead used by the size estimate.
const CUE_OVERHEAD_ESTIMATE: u64 = 18;

/// Collaborators the assembler works with.
///
/// The session owns all of them; the assembler only borrows them for the
/// duration of one call.
pub struct MuxContext<'a> {
    pub tracks: &'a mut TrackRegistry,
    pub cues: &'a mut CueIndex,
    pub versions: &'a mut DocTypeVersionTracker,
    pub output: &'a mut dyn MuxOutput,
    pub seek: &'a mut dyn SeekIndex,
    pub chapters: &'a mut dyn ChapterSink,
}

/// Why the open cluster was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Block timestamps would not fit the signed 16-bit delta.
    TimestampDelta,
    /// Packet follows a gap in the timeline.
    Gap,
    Duration,
    BlockCount,
    ContentSize,
    VideoKeyFrame,
    Split,
    Finish,
}

/// Accounting for the file currently written.
#[derive(Debug, Default, Clone)]
struct FileState {
    header_overhead: u64,
    bytes_written: u64,
    cues: u64,
    /// Input timestamp of the first packet queued for this file.
    first_input_timestamp: Option<i64>,
    /// Output timeline bounds of the rendered blocks.
    min_timestamp: Option<i64>,
    max_end_timestamp: Option<i64>,
    video_key_frame_seen: bool,
}

/// Assembles packets into clusters and files.
#[derive(Debug)]
pub struct ClusterAssembler {
    config: MuxConfig,
    scale: i64,

    pending: Vec<Packet>,
    min_timestamp: Option<i64>,
    max_timestamp: Option<i64>,
    max_end_timestamp: Option<i64>,
    content_size: u64,
    previous_cluster_size: Option<u64>,

    file: FileState,
    num_files: usize,

    split_points: Vec<SplitPoint>,
    split_index: usize,
    frame_number: i64,

    /// Subtracted from input timestamps.
    timestamp_offset: i64,
    /// Timeline removed between appended parts.
    discarded_duration: i64,
    discarding: bool,
    discarded_range: Option<(i64, i64)>,
    /// Input timestamp where the last kept content ended.
    last_kept_end: Option<i64>,

    next_chapter: i64,
    chapter_number: usize,
    last_chapter_timestamp: Option<i64>,
    last_source_file: Option<usize>,

    clusters_written: u64,
}

impl ClusterAssembler {
    pub fn new(config: MuxConfig) -> Self {
        let scale = config.scale();
        let split_points = config.splitting.points.clone();
        Self {
            config,
            scale,
            pending: Vec::new(),
            min_timestamp: None,
            max_timestamp: None,
            max_end_timestamp: None,
            content_size: 0,
            previous_cluster_size: None,
            file: FileState::default(),
            num_files: 0,
            split_points,
            split_index: 0,
            frame_number: 0,
            timestamp_offset: 0,
            discarded_duration: 0,
            discarding: false,
            discarded_range: None,
            last_kept_end: None,
            next_chapter: 0,
            chapter_number: 0,
            last_chapter_timestamp: None,
            last_source_file: None,
            clusters_written: 0,
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Whether any packet has been accepted yet.
    pub fn has_started(&self) -> bool {
        self.num_files > 0
    }

    /// Number of packets in the open cluster.
    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    pub fn clusters_written(&self) -> u64 {
        self.clusters_written
    }

    pub fn files_started(&self) -> usize {
        self.num_files
    }

    /// Whether content is currently being dropped between split parts.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// First and last input timestamps dropped by the current discard span.
    pub fn discarded_range(&self) -> Option<(i64, i64)> {
        self.discarded_range
    }

    /// Offset currently subtracted from input timestamps.
    pub fn effective_offset(&self) -> i64 {
        self.timestamp_offset + self.discarded_duration
    }

    /// Queue one packet, flushing and splitting as needed.
    pub fn add_packet(&mut self, packet: Packet, ctx: &mut MuxContext<'_>) -> Result<()> {
        if !ctx.output.is_open() {
            self.start_file(ctx)?;
        }

        let track_type = ctx.tracks.get(packet.track)?.config.track_type;
        let video_track = ctx.tracks.video_track();
        let is_video = video_track == Some(packet.track);
        let is_key = packet.is_key_frame();

        if let Some(reason) = self.pre_flush_reason(&packet, is_video, is_key) {
            tracing::debug!(?reason, timestamp = packet.timestamp, "Flushing cluster");
            self.render(ctx)?;
        }

        let counts_for_split = is_key && (is_video || video_track.is_none());
        if counts_for_split {
            let frame = self.frame_number + 1;
            if let Some(point) = self.split_point_reached(&packet, frame) {
                self.split(&packet, point, ctx)?;
            }
        }

        if self.file.first_input_timestamp.is_none() {
            self.file.first_input_timestamp = Some(packet.timestamp);
        }
        if is_video && is_key {
            self.file.video_key_frame_seen = true;
        }
        if is_video {
            self.frame_number += 1;
        }

        if ctx.tracks.reference_track() == Some(packet.track) && !self.discarding {
            self.generate_chapters(&packet, ctx);
        }

        self.queue(packet);
        tracing::trace!(?track_type, pending = self.pending.len(), "Queued packet");

        if let Some(reason) = self.post_append_reason() {
            tracing::debug!(?reason, "Flushing cluster");
            self.render(ctx)?;
        }

        Ok(())
    }

    /// Flush the open cluster and finish the current file.
    pub fn finish(&mut self, ctx: &mut MuxContext<'_>) -> Result<HeadUpdateResult> {
        tracing::debug!(reason = ?FlushReason::Finish, "Flushing cluster");
        self.render(ctx)?;
        if !ctx.output.is_open() {
            return Ok(HeadUpdateResult::NoUpdateNeeded);
        }
        self.finish_file(ctx)
    }

    fn queue(&mut self, packet: Packet) {
        let ts = packet.timestamp;
        let end = packet.end_timestamp();
        self.min_timestamp = Some(self.min_timestamp.map_or(ts, |m| m.min(ts)));
        self.max_timestamp = Some(self.max_timestamp.map_or(ts, |m| m.max(ts)));
        self.max_end_timestamp = Some(self.max_end_timestamp.map_or(end, |m| m.max(end)));
        self.content_size += packet.data.len() as u64;
        self.pending.push(packet);
    }

    fn pre_flush_reason(&self, packet: &Packet, is_video: bool, is_key: bool) -> Option<FlushReason> {
        let (Some(min), Some(max)) = (self.min_timestamp, self.max_timestamp) else {
            return None;
        };
        let ts = packet.timestamp;

        let offset = self.effective_offset();
        let low = (min.min(ts) - offset).div_euclid(self.scale);
        let high = (max.max(ts) - offset).div_euclid(self.scale);
        if high - low >= i64::from(i16::MAX) {
            return Some(FlushReason::TimestampDelta);
        }
        if packet.follows_gap {
            return Some(FlushReason::Gap);
        }
        if ts - min > self.config.cluster.max_duration {
            return Some(FlushReason::Duration);
        }
        if self.config.cluster.new_cluster_on_video_key_frame
            && is_video
            && is_key
            && self.file.video_key_frame_seen
        {
            return Some(FlushReason::VideoKeyFrame);
        }
        None
    }

    fn post_append_reason(&self) -> Option<FlushReason> {
        let limits = &self.config.cluster;
        if let (Some(min), Some(end)) = (self.min_timestamp, self.max_end_timestamp) {
            if end - min > limits.max_duration {
                return Some(FlushReason::Duration);
            }
        }
        if self.pending.len() >= limits.max_blocks {
            return Some(FlushReason::BlockCount);
        }
        if self.content_size > limits.max_content_size {
            return Some(FlushReason::ContentSize);
        }
        None
    }

    /// Estimated size of the file if the open cluster were written now.
    fn estimated_file_size(&self) -> u64 {
        let cluster: u64 = self
            .pending
            .iter()
            .map(|p| {
                let overhead = if !p.has_references() {
                    10
                } else if p.is_p_frame() {
                    13
                } else {
                    16
                };
                p.data.len() as u64 + overhead
            })
            .sum();
        self.file.header_overhead
            + self.file.bytes_written
            + CLUSTER_OVERHEAD_ESTIMATE
            + cluster
            + CUE_OVERHEAD_ESTIMATE * self.file.cues
    }

    fn split_point_reached(&self, packet: &Packet, frame: i64) -> Option<SplitPoint> {
        let point = *self.split_points.get(self.split_index)?;

        if point.create_new_file {
            if let Some(max_files) = self.config.splitting.max_files {
                if self.num_files >= max_files {
                    return None;
                }
            }
        }

        let reached = match point.kind {
            SplitKind::Size => self.estimated_file_size() > point.point as u64,
            SplitKind::Duration => self
                .file
                .first_input_timestamp
                .is_some_and(|first| packet.timestamp - first >= point.point),
            SplitKind::Timestamp | SplitKind::Parts => packet.timestamp >= point.point,
            SplitKind::FrameField | SplitKind::PartsFrameField => frame >= point.point,
        };

        reached.then_some(point)
    }

    fn split(&mut self, packet: &Packet, point: SplitPoint, ctx: &mut MuxContext<'_>) -> Result<()> {
        tracing::debug!(
            kind = ?point.kind,
            point = point.point,
            timestamp = packet.timestamp,
            discard = point.discard,
            new_file = point.create_new_file,
            "Split point reached"
        );

        tracing::debug!(reason = ?FlushReason::Split, "Flushing cluster");
        self.render(ctx)?;

        let mut new_file = false;
        if point.create_new_file && self.file.bytes_written > 0 {
            self.finish_file(ctx)?;
            if !self.config.splitting.link_files {
                self.timestamp_offset = packet.timestamp;
                self.discarded_duration = 0;
            }
            self.start_file(ctx)?;
            self.last_kept_end = None;
            new_file = true;
        }

        let was_discarding = self.discarding;
        self.handle_discarded_duration(packet, new_file, point.discard);

        self.discarding = point.discard;
        if point.use_once {
            self.split_index += 1;
        }

        if was_discarding
            && !self.discarding
            && !new_file
            && self.config.chapters.mode == ChapterGeneration::WhenAppending
        {
            let timestamp = packet.timestamp - self.effective_offset();
            self.emit_chapter(timestamp, ctx);
        }

        Ok(())
    }

    /// Close the timeline gap left by discarded content when the next kept
    /// part continues the current file.
    fn handle_discarded_duration(&mut self, packet: &Packet, new_file: bool, discard_next: bool) {
        if !self.discarding || discard_next {
            return;
        }

        if let Some((first, last)) = self.discarded_range.take() {
            tracing::debug!(first, last, "Finished discarding");
        }

        if new_file && !self.config.splitting.link_files {
            return;
        }

        let reference = self.last_kept_end.unwrap_or(self.effective_offset());
        let gap = packet.timestamp - reference;
        if gap > 0 {
            self.discarded_duration += gap;
            tracing::debug!(
                gap,
                discarded_duration = self.discarded_duration,
                "Removing discarded span from timeline"
            );
        }
    }

    fn generate_chapters(&mut self, packet: &Packet, ctx: &mut MuxContext<'_>) {
        let timestamp = packet.timestamp - self.effective_offset();
        match self.config.chapters.mode {
            ChapterGeneration::None => {}
            ChapterGeneration::Interval(interval) => {
                if timestamp >= self.next_chapter {
                    self.emit_chapter(timestamp, ctx);
                    while self.next_chapter <= timestamp {
                        self.next_chapter += interval;
                    }
                }
            }
            ChapterGeneration::WhenAppending => {
                if self.last_source_file != Some(packet.source_file) {
                    self.last_source_file = Some(packet.source_file);
                    self.emit_chapter(timestamp, ctx);
                }
            }
        }
    }

    fn emit_chapter(&mut self, timestamp: i64, ctx: &mut MuxContext<'_>) {
        if self.last_chapter_timestamp == Some(timestamp) {
            return;
        }
        self.chapter_number += 1;
        let name = format_chapter_name(
            &self.config.chapters.name_template,
            self.chapter_number,
            timestamp,
        );
        ctx.chapters.generate_chapter(timestamp, &name);
        self.last_chapter_timestamp = Some(timestamp);
    }

    fn start_file(&mut self, ctx: &mut MuxContext<'_>) -> Result<()> {
        let header_overhead = ctx.output.start_file(ctx.tracks, ctx.versions)?;
        self.num_files += 1;
        self.file = FileState {
            header_overhead,
            ..FileState::default()
        };
        self.previous_cluster_size = None;
        tracing::info!(file = self.num_files, header_overhead, "Started output file");
        Ok(())
    }

    fn finish_file(&mut self, ctx: &mut MuxContext<'_>) -> Result<HeadUpdateResult> {
        if self.config.cues.enabled {
            let data_start = ctx.output.segment_data_start();
            let file = ctx.output.file()?;
            if let Some(bytes) = ctx.cues.write(file, ctx.seek, ctx.versions, data_start)? {
                self.file.bytes_written += bytes;
            }
        }

        let duration = match (self.file.min_timestamp, self.file.max_end_timestamp) {
            (Some(min), Some(end)) => Some(end - min.min(0)),
            _ => None,
        };
        let entries = ctx.seek.take_entries();
        let result = ctx.output.finish_file(entries, ctx.versions, duration)?;

        tracing::info!(
            file = self.num_files,
            bytes = self.file.bytes_written,
            cues = self.file.cues,
            ?result,
            "Finished output file"
        );
        Ok(result)
    }
}
