//! Rendering the open cluster.

use std::collections::HashMap;

use mkvmux_ebml::{ElementId, ElementSink};

use super::{ClusterAssembler, MuxContext};
use crate::block::{BlockBlob, BlockBlobMode};
use crate::cluster::Cluster;
use crate::cues::CuePoint;
use crate::packet::Packet;
use crate::track::{CueStrategy, Track, TrackType};
use crate::Result;

/// Minimum distance between two cue points of a sparse track.
const SPARSE_CUE_INTERVAL: i64 = 2_000_000_000;

/// Lacing state of one track within the cluster being rendered.
#[derive(Debug, Default)]
struct RenderGroup {
    blob: Option<usize>,
    more_data: bool,
    durations: Vec<i64>,
    duration_mandatory: bool,
    /// Nanoseconds lost by truncating the first frame's timestamp to the
    /// timestamp scale.
    first_timestamp_rounding_error: i64,
    /// A frame carrying block-level data was added; nothing may follow it.
    closed: bool,
    /// Where the next frame has to start to continue the lace. Unknown when
    /// the last frame had no duration, which ends the lace.
    expected_next: Option<i64>,
}

impl RenderGroup {
    fn needs_new_blob(&self, packet: &Packet, timestamp: i64, lacing: bool) -> bool {
        self.blob.is_none()
            || !self.more_data
            || !lacing
            || !packet.is_key_frame()
            || needs_group(packet)
            || packet.duration_mandatory
            || self.closed
            || self.expected_next != Some(timestamp)
    }

    fn reset(&mut self, blob: usize, timestamp: i64, scale: i64) {
        self.blob = Some(blob);
        self.more_data = true;
        self.durations.clear();
        self.duration_mandatory = false;
        self.first_timestamp_rounding_error = timestamp - timestamp.div_euclid(scale) * scale;
        self.closed = false;
        self.expected_next = None;
    }

    fn total_duration(&self) -> i64 {
        self.durations.iter().sum()
    }
}

/// Round `value` to the nearest multiple of `scale`.
fn round_to_scale(value: i64, scale: i64) -> i64 {
    (value + scale / 2).div_euclid(scale) * scale
}

/// Whether the packet carries data only a BlockGroup can hold.
fn needs_group(packet: &Packet) -> bool {
    (packet.duration_mandatory && packet.duration.is_some())
        || !packet.block_additions.is_empty()
        || packet.codec_state.is_some()
        || packet.discard_padding.is_some()
        || packet.reference_priority > 0
}

/// Block type a packet needs.
fn blob_mode_for(packet: &Packet, configured: BlockBlobMode) -> BlockBlobMode {
    if needs_group(packet) {
        BlockBlobMode::NoSimple
    } else {
        configured
    }
}

fn wants_cue(track: &Track, timestamp: i64, key: bool, has_video: bool) -> bool {
    match track.config.cue_strategy {
        CueStrategy::None => false,
        CueStrategy::IFrames => key,
        CueStrategy::All => true,
        CueStrategy::Sparse => {
            track.config.track_type == TrackType::Audio
                && !has_video
                && track
                    .last_cue_timestamp
                    .map_or(true, |last| timestamp - last >= SPARSE_CUE_INTERVAL)
        }
    }
}

impl ClusterAssembler {
    /// Write the open cluster, or drop it while discarding.
    pub(super) fn render(&mut self, ctx: &mut MuxContext<'_>) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let packets = std::mem::take(&mut self.pending);
        self.min_timestamp = None;
        self.max_timestamp = None;
        self.max_end_timestamp = None;
        self.content_size = 0;

        if self.discarding {
            for packet in &packets {
                let ts = packet.timestamp;
                self.discarded_range = Some(match self.discarded_range {
                    Some((first, last)) => (first.min(ts), last.max(ts)),
                    None => (ts, ts),
                });
            }
            tracing::debug!(packets = packets.len(), range = ?self.discarded_range, "Discarded cluster");
            return Ok(());
        }

        if self.file.min_timestamp.is_none() {
            self.align_file_start(&packets);
        }

        let offset = self.effective_offset();
        let scale = self.scale;
        let configured_mode = self.config.effective_block_mode();
        let lacing_enabled = self.config.lacing;
        let cues_enabled = self.config.cues.enabled;
        let has_video = ctx.tracks.has_video();

        let mut blobs: Vec<BlockBlob> = Vec::new();
        let mut groups: HashMap<u64, RenderGroup> = HashMap::new();
        let mut cue_points: Vec<(u64, i64)> = Vec::new();
        let mut finished_groups: Vec<(usize, RenderGroup)> = Vec::new();

        for packet in packets {
            let mut timestamp = packet.timestamp - offset;
            if timestamp < 0 {
                tracing::warn!(
                    track = packet.track,
                    timestamp = packet.timestamp,
                    offset,
                    "Block before the start of the file, moved to 0"
                );
                timestamp = 0;
            }
            let track = ctx.tracks.get_mut(packet.track)?;
            let default_duration = track.config.default_duration.map(|d| d as i64);
            let lacing = lacing_enabled && track.config.lacing;
            let mode = blob_mode_for(&packet, configured_mode);

            let group = groups.entry(packet.track).or_default();
            if group.needs_new_blob(&packet, timestamp, lacing) {
                if let Some(index) = group.blob {
                    finished_groups.push((index, std::mem::take(group)));
                }
                blobs.push(BlockBlob::new(packet.track, mode));
                group.reset(blobs.len() - 1, timestamp, scale);
            }
            let Some(index) = group.blob else {
                continue;
            };
            let blob = &mut blobs[index];

            let first_frame = blob.frame_count() == 0;
            let duration = packet.duration_or_zero();
            let bytes = packet.data.len();
            let key = packet.is_key_frame();
            let closes_lace = needs_group(&packet) || packet.duration_mandatory;

            group.more_data = blob.add_frame_auto(
                timestamp,
                packet.data,
                packet.bref.map(|t| (t - offset).max(0)),
                packet.fref.map(|t| (t - offset).max(0)),
                lacing,
            );
            if let Some(key) = packet.key_flag {
                blob.set_key_flag(key);
            }
            if let Some(discardable) = packet.discardable_flag {
                blob.set_discardable_flag(discardable);
            }
            // Group-only data always opens its own BlockGroup; see needs_group.
            if packet.reference_priority > 0 {
                blob.set_reference_priority(packet.reference_priority)?;
            }
            for addition in packet.block_additions {
                blob.add_block_addition(addition)?;
            }
            if let Some(state) = packet.codec_state {
                blob.set_codec_state(state)?;
            }
            if let Some(padding) = packet.discard_padding {
                blob.set_discard_padding(padding)?;
            }

            group.durations.push(duration);
            group.duration_mandatory |= packet.duration_mandatory;
            group.closed = closes_lace;
            group.expected_next = packet.duration.or(default_duration).map(|d| timestamp + d);

            if first_frame && cues_enabled && wants_cue(track, timestamp, key, has_video) {
                cue_points.push((packet.track, timestamp));
                track.last_cue_timestamp = Some(timestamp);
            }

            track.statistics.account(timestamp, duration, bytes);

            let end = timestamp + duration;
            self.file.min_timestamp = Some(self.file.min_timestamp.map_or(timestamp, |m| m.min(timestamp)));
            self.file.max_end_timestamp = Some(self.file.max_end_timestamp.map_or(end, |m| m.max(end)));
            let input_end = end + offset;
            self.last_kept_end = Some(self.last_kept_end.map_or(input_end, |m| m.max(input_end)));
        }

        finished_groups.extend(
            groups
                .into_values()
                .filter_map(|g| g.blob.map(|index| (index, g))),
        );
        for (index, group) in &finished_groups {
            self.set_duration(&mut blobs[*index], group, ctx)?;
        }

        let mut cluster = Cluster::with_previous_size(self.previous_cluster_size);
        for blob in blobs {
            cluster.add_blob(blob);
        }
        let sealed = cluster.seal(scale)?;
        let mut element = sealed.to_element()?;

        let data_start = ctx.output.segment_data_start();
        let file = ctx.output.file()?;
        let position = file.position()? - data_start;
        ctx.seek.index(ElementId::CLUSTER, position);
        let written = ctx.versions.render(&mut element, file, false)?;
        let layout = sealed.layout(position, &element);

        for (track, timestamp) in &cue_points {
            ctx.cues.add_point(CuePoint::new(*timestamp, *track, position));
        }
        self.file.cues += cue_points.len() as u64;
        ctx.cues.postprocess_cues(&layout, ctx.tracks);

        self.file.bytes_written += written;
        self.previous_cluster_size = Some(written);
        self.clusters_written += 1;

        tracing::debug!(
            position,
            bytes = written,
            blocks = sealed.blobs().len(),
            cues = cue_points.len(),
            base = sealed.base_timestamp(),
            "Rendered cluster"
        );

        Ok(())
    }

    /// Decide whether the blob carries a BlockDuration and remember the
    /// group's duration for its cue point.
    /// Shift the timeline so the first cluster of a file starts at 0 or
    /// later, e.g. when audio older than the split key frame follows it.
    fn align_file_start(&mut self, packets: &[Packet]) {
        let offset = self.effective_offset();
        let Some(lowest) = packets.iter().map(|p| p.timestamp - offset).min() else {
            return;
        };
        if lowest < 0 {
            self.timestamp_offset += lowest;
            tracing::debug!(
                shift = -lowest,
                offset = self.effective_offset(),
                "Moved file start to the earliest block"
            );
        }
    }

    fn set_duration(
        &self,
        blob: &mut BlockBlob,
        group: &RenderGroup,
        ctx: &mut MuxContext<'_>,
    ) -> Result<()> {
        let scale = self.scale;
        let total = group.total_duration();
        let default_duration = ctx
            .tracks
            .get(blob.track())?
            .config
            .default_duration
            .map(|d| d as i64 * group.durations.len() as i64);

        ctx.cues.set_duration_for(blob.track(), blob.timestamp(), total);

        let write = if group.duration_mandatory {
            true
        } else if total > 0 {
            match default_duration {
                Some(default) => round_to_scale(total, scale) != round_to_scale(default, scale),
                None => self.config.use_durations,
            }
        } else {
            false
        };

        if !write {
            return Ok(());
        }
        if blob.is_simple() {
            tracing::trace!(
                track = blob.track(),
                timestamp = blob.timestamp(),
                total,
                "SimpleBlock cannot carry a duration"
            );
            return Ok(());
        }

        blob.set_block_duration(total + group.first_timestamp_rounding_error)
    }
}
