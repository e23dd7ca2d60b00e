//! Cue index.
//!
//! Cue points are collected per file while clusters are rendered. Their
//! relative positions and durations are only known once the cluster holding
//! the block has been laid out, so [`CueIndex::postprocess_cues`] fills them
//! in after every cluster. The whole index is written in one go when the file
//! is finished: the exact size is computed first so the Cues header can be
//! written once, followed by the point bodies.

use std::collections::{HashMap, VecDeque};

use mkvmux_ebml::vint::{element_size, uint_element_size, vint_length};
use mkvmux_ebml::{EbmlElement, ElementId, ElementSink};

use crate::cluster::ClusterLayout;
use crate::doc_version::DocTypeVersionTracker;
use crate::seek::SeekIndex;
use crate::track::TrackRegistry;
use crate::{Error, Result};

/// One seek index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuePoint {
    /// Absolute block timestamp in nanoseconds.
    pub timestamp: i64,
    pub track: u64,
    /// Segment-relative position of the cluster.
    pub cluster_position: u64,
    /// Offset of the block from the cluster's data start.
    pub relative_position: Option<u64>,
    /// Block duration in nanoseconds.
    pub duration: Option<i64>,
    /// Segment-relative position of the block's CodecState.
    pub codec_state_position: Option<u64>,
}

impl CuePoint {
    pub fn new(timestamp: i64, track: u64, cluster_position: u64) -> Self {
        Self {
            timestamp,
            track,
            cluster_position,
            relative_position: None,
            duration: None,
            codec_state_position: None,
        }
    }
}

/// Seek index of one output file.
#[derive(Debug, Clone)]
pub struct CueIndex {
    scale: i64,
    points: Vec<CuePoint>,
    num_postprocessed: usize,
    durations: HashMap<(u64, i64), i64>,
    write_durations: bool,
    write_relative_positions: bool,
    write_codec_states: bool,
}

impl CueIndex {
    /// Create an index for timestamp scale `scale` (nanoseconds per unit).
    pub fn new(scale: i64) -> Self {
        Self {
            scale,
            points: Vec::new(),
            num_postprocessed: 0,
            durations: HashMap::new(),
            write_durations: true,
            write_relative_positions: true,
            write_codec_states: true,
        }
    }

    /// Enable or disable CueDuration and CueRelativePosition.
    pub fn with_optional_fields(mut self, durations: bool, relative_positions: bool) -> Self {
        self.write_durations = durations;
        self.write_relative_positions = relative_positions;
        self
    }

    /// Drop optional fields the DocType version limit does not allow.
    pub fn configure_for_version_limit(&mut self, limit: Option<u64>) {
        let Some(limit) = limit else {
            return;
        };
        if limit < 4 {
            self.write_durations = false;
            self.write_relative_positions = false;
        }
        if limit < 2 {
            self.write_codec_states = false;
        }
    }

    pub fn points(&self) -> &[CuePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point for a freshly rendered block.
    pub fn add_point(&mut self, point: CuePoint) {
        if point.timestamp < 0 {
            tracing::warn!(
                track = point.track,
                timestamp = point.timestamp,
                "Dropping cue point before the start of the file"
            );
            return;
        }
        self.points.push(point);
    }

    /// Merge points found while re-scanning already written data.
    ///
    /// They are taken as final and never postprocessed.
    pub fn add(&mut self, points: impl IntoIterator<Item = CuePoint>) {
        let pending: Vec<CuePoint> = self.points.drain(self.num_postprocessed..).collect();
        self.points.extend(points.into_iter().filter(|p| p.timestamp >= 0));
        self.num_postprocessed = self.points.len();
        self.points.extend(pending);
    }

    /// Merge the points of a Cues element read back from a file.
    pub fn add_cues_element(&mut self, cues: &EbmlElement) -> Result<usize> {
        if cues.id != ElementId::CUES {
            return Err(Error::invariant(format!("expected Cues, got {}", cues.id)));
        }

        let mut found = Vec::new();
        for point in cues.children().iter().filter(|c| c.id == ElementId::CUE_POINT) {
            let Some(time) = point.child_uint(ElementId::CUE_TIME) else {
                continue;
            };
            let timestamp = time as i64 * self.scale;

            for positions in point
                .children()
                .iter()
                .filter(|c| c.id == ElementId::CUE_TRACK_POSITIONS)
            {
                let (Some(track), Some(cluster_position)) = (
                    positions.child_uint(ElementId::CUE_TRACK),
                    positions.child_uint(ElementId::CUE_CLUSTER_POSITION),
                ) else {
                    continue;
                };
                found.push(CuePoint {
                    timestamp,
                    track,
                    cluster_position,
                    relative_position: positions.child_uint(ElementId::CUE_RELATIVE_POSITION),
                    duration: positions
                        .child_uint(ElementId::CUE_DURATION)
                        .map(|d| d as i64 * self.scale),
                    codec_state_position: positions
                        .child_uint(ElementId::CUE_CODEC_STATE)
                        .filter(|p| *p != 0),
                });
            }
        }

        let count = found.len();
        self.add(found);
        tracing::debug!(count, "Merged cue points from existing Cues");
        Ok(count)
    }

    /// Remember the duration of the block of `track` at `timestamp`.
    pub fn set_duration_for(&mut self, track: u64, timestamp: i64, duration: i64) {
        if duration > 0 {
            self.durations.insert((track, timestamp), duration);
        }
    }

    /// Fill relative positions, codec state positions and durations of the
    /// points added since the last call from the layout of the cluster just
    /// written.
    ///
    /// Several blocks of one track may share a timestamp; they are matched
    /// to the points in the order they appear in the cluster. Points without
    /// a matching block keep their fields empty.
    pub fn postprocess_cues(&mut self, layout: &ClusterLayout, tracks: &TrackRegistry) {
        let mut positions: HashMap<(u64, i64), VecDeque<(u64, Option<u64>)>> = HashMap::new();
        for block in &layout.blocks {
            positions
                .entry((block.track, block.timestamp))
                .or_default()
                .push_back((block.relative_position, block.codec_state_position));
        }

        let mut matched = 0usize;
        for point in &mut self.points[self.num_postprocessed..] {
            let key = (point.track, point.timestamp);

            if let Some((relative, codec_state)) =
                positions.get_mut(&key).and_then(VecDeque::pop_front)
            {
                point.relative_position = Some(relative);
                point.codec_state_position = codec_state;
                matched += 1;
            }

            let wants_duration = tracks
                .get(point.track)
                .map(|t| t.config.wants_cue_duration)
                .unwrap_or(false);
            if wants_duration {
                if let Some(duration) = self.durations.get(&key) {
                    point.duration = Some(*duration);
                }
            }
        }

        tracing::trace!(
            new_points = self.points.len() - self.num_postprocessed,
            matched,
            cluster = layout.position,
            "Postprocessed cue points"
        );

        self.num_postprocessed = self.points.len();
        self.durations.clear();
    }

    /// Shift all positions at or after `old_position` by `delta` bytes.
    pub fn adjust_positions(&mut self, old_position: u64, delta: i64) {
        let shift = |position: &mut u64| {
            if *position >= old_position {
                *position = position.saturating_add_signed(delta);
            }
        };

        for point in &mut self.points {
            shift(&mut point.cluster_position);
            if let Some(codec_state) = point.codec_state_position.as_mut() {
                shift(codec_state);
            }
        }
    }

    fn cue_time(&self, point: &CuePoint) -> u64 {
        // Points are never negative; see add_point.
        point.timestamp.div_euclid(self.scale) as u64
    }

    fn cue_duration(&self, point: &CuePoint) -> Option<u64> {
        point
            .duration
            .filter(|_| self.write_durations)
            .map(|d| ((d + self.scale / 2) / self.scale).max(0) as u64)
    }

    fn relative_position(&self, point: &CuePoint) -> Option<u64> {
        point.relative_position.filter(|_| self.write_relative_positions)
    }

    fn codec_state_position(&self, point: &CuePoint) -> Option<u64> {
        point.codec_state_position.filter(|_| self.write_codec_states)
    }

    /// Exact size of the CuePoint element for `point`.
    pub fn calculate_point_size(&self, point: &CuePoint) -> u64 {
        let mut positions = uint_element_size(ElementId::CUE_TRACK, point.track)
            + uint_element_size(ElementId::CUE_CLUSTER_POSITION, point.cluster_position);
        if let Some(relative) = self.relative_position(point) {
            positions += uint_element_size(ElementId::CUE_RELATIVE_POSITION, relative);
        }
        if let Some(duration) = self.cue_duration(point) {
            positions += uint_element_size(ElementId::CUE_DURATION, duration);
        }
        if let Some(codec_state) = self.codec_state_position(point) {
            positions += uint_element_size(ElementId::CUE_CODEC_STATE, codec_state);
        }

        let body = uint_element_size(ElementId::CUE_TIME, self.cue_time(point))
            + element_size(ElementId::CUE_TRACK_POSITIONS, positions);
        element_size(ElementId::CUE_POINT, body)
    }

    /// Exact size of the Cues body (all points).
    pub fn calculate_total_size(&self) -> u64 {
        self.points
            .iter()
            .map(|p| self.calculate_point_size(p))
            .sum()
    }

    /// Build the CuePoint element for `point`.
    pub fn point_element(&self, point: &CuePoint) -> EbmlElement {
        let mut positions = vec![
            EbmlElement::uint(ElementId::CUE_TRACK, point.track),
            EbmlElement::uint(ElementId::CUE_CLUSTER_POSITION, point.cluster_position),
        ];
        if let Some(relative) = self.relative_position(point) {
            positions.push(EbmlElement::uint(ElementId::CUE_RELATIVE_POSITION, relative));
        }
        if let Some(duration) = self.cue_duration(point) {
            positions.push(EbmlElement::uint(ElementId::CUE_DURATION, duration));
        }
        if let Some(codec_state) = self.codec_state_position(point) {
            positions.push(EbmlElement::uint(ElementId::CUE_CODEC_STATE, codec_state));
        }

        EbmlElement::master(
            ElementId::CUE_POINT,
            vec![
                EbmlElement::uint(ElementId::CUE_TIME, self.cue_time(point)),
                EbmlElement::master(ElementId::CUE_TRACK_POSITIONS, positions),
            ],
        )
    }

    /// Sort the points by (timestamp, track). Ties keep insertion order.
    pub fn sort(&mut self) {
        self.points.sort_by_key(|p| (p.timestamp, p.track));
    }

    /// Write the Cues element at the sink's current position and clear the
    /// index.
    ///
    /// Returns the number of bytes written, `None` if there was nothing to
    /// write.
    pub fn write<S: ElementSink + ?Sized>(
        &mut self,
        out: &mut S,
        seek: &mut dyn SeekIndex,
        versions: &mut DocTypeVersionTracker,
        segment_data_start: u64,
    ) -> Result<Option<u64>> {
        if self.points.is_empty() {
            return Ok(None);
        }

        self.sort();

        let body_size = self.calculate_total_size();
        let size_length = vint_length(body_size);
        let position = out.position()?;
        let relative = position.checked_sub(segment_data_start).ok_or_else(|| {
            Error::invariant("Cues position before the segment data start")
        })?;

        seek.index(ElementId::CUES, relative);
        out.write_head(ElementId::CUES, body_size, size_length)?;

        let mut written = 0;
        for point in &self.points {
            let mut element = self.point_element(point);
            written += versions.render(&mut element, out, false)?;
        }

        if written != body_size {
            return Err(Error::invariant(format!(
                "Cues body is {written} bytes, {body_size} were announced"
            )));
        }

        tracing::debug!(
            points = self.points.len(),
            bytes = body_size,
            position = relative,
            "Wrote cues"
        );

        self.points.clear();
        self.num_postprocessed = 0;
        self.durations.clear();

        Ok(Some(
            (ElementId::CUES.encoded_len() + size_length) as u64 + body_size,
        ))
    }
}
