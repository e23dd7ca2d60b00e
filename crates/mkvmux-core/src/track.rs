//! Track registrations and per-track statistics.
//!
//! Packetizers register a [`TrackConfig`] once per output track. The registry
//! also answers the two session-wide questions the assembler needs: which
//! track is "the" video track (split decisions are evaluated against its key
//! frames) and which track drives chapter generation.

use std::collections::BTreeMap;

use bytes::Bytes;
use mkvmux_ebml::{EbmlElement, ElementId};

use crate::{Error, Result};

/// Matroska track type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum TrackType {
    Video,
    Audio,
    Subtitle,
    Buttons,
}

impl TrackType {
    /// Value written into the TrackType element.
    pub fn matroska_value(self) -> u64 {
        match self {
            TrackType::Video => 0x01,
            TrackType::Audio => 0x02,
            TrackType::Subtitle => 0x11,
            TrackType::Buttons => 0x12,
        }
    }
}

/// Which blocks of a track get cue points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum CueStrategy {
    /// No cue points.
    None,
    /// Key frames only.
    #[default]
    IFrames,
    /// Every block.
    All,
    /// Audio tracks in files without video: one cue point every two seconds.
    Sparse,
}

/// Video track properties.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct VideoSettings {
    pub pixel_width: u64,
    pub pixel_height: u64,
    /// StereoMode value; anything but 0 requires DocType version 3.
    pub stereo_mode: Option<u64>,
}

/// Audio track properties.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub channels: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sampling_frequency: 48_000.0,
            channels: 2,
        }
    }
}

/// Per-track configuration supplied by the packetizer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackConfig {
    /// Track number used in block headers.
    pub number: u64,
    /// Track UID; 0 means "same as the track number".
    #[cfg_attr(feature = "serialize", serde(default))]
    pub uid: u64,
    pub track_type: TrackType,
    pub codec_id: String,
    #[cfg_attr(feature = "serialize", serde(default, skip))]
    pub codec_private: Option<Bytes>,
    /// Default duration per frame in nanoseconds.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub default_duration: Option<u64>,
    #[cfg_attr(feature = "serialize", serde(default = "default_true"))]
    pub lacing: bool,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub cue_strategy: CueStrategy,
    /// Whether cue points of this track carry CueDuration.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub wants_cue_duration: bool,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub language: Option<String>,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub video: Option<VideoSettings>,
    #[cfg_attr(feature = "serialize", serde(default))]
    pub audio: Option<AudioSettings>,
}

#[cfg(feature = "serialize")]
fn default_true() -> bool {
    true
}

impl TrackConfig {
    /// Create a configuration with default settings for the track type.
    pub fn new(number: u64, track_type: TrackType, codec_id: impl Into<String>) -> Self {
        Self {
            number,
            uid: 0,
            track_type,
            codec_id: codec_id.into(),
            codec_private: None,
            default_duration: None,
            lacing: track_type == TrackType::Audio,
            cue_strategy: match track_type {
                TrackType::Video => CueStrategy::IFrames,
                TrackType::Audio => CueStrategy::Sparse,
                TrackType::Subtitle | TrackType::Buttons => CueStrategy::IFrames,
            },
            wants_cue_duration: matches!(track_type, TrackType::Subtitle),
            language: None,
            video: (track_type == TrackType::Video).then(VideoSettings::default),
            audio: (track_type == TrackType::Audio).then(AudioSettings::default),
        }
    }

    pub fn with_lacing(mut self, lacing: bool) -> Self {
        self.lacing = lacing;
        self
    }

    pub fn with_cue_strategy(mut self, strategy: CueStrategy) -> Self {
        self.cue_strategy = strategy;
        self
    }

    pub fn with_default_duration(mut self, duration: u64) -> Self {
        self.default_duration = Some(duration);
        self
    }

    pub fn with_cue_duration(mut self, wants: bool) -> Self {
        self.wants_cue_duration = wants;
        self
    }

    pub fn with_codec_private(mut self, data: impl Into<Bytes>) -> Self {
        self.codec_private = Some(data.into());
        self
    }

    pub fn with_video(mut self, video: VideoSettings) -> Self {
        self.video = Some(video);
        self
    }

    /// UID written to the file.
    pub fn effective_uid(&self) -> u64 {
        if self.uid == 0 {
            self.number
        } else {
            self.uid
        }
    }

    /// Build the TrackEntry element for this track.
    pub fn to_element(&self) -> EbmlElement {
        let mut children = vec![
            EbmlElement::uint(ElementId::TRACK_NUMBER, self.number),
            EbmlElement::uint(ElementId::TRACK_UID, self.effective_uid()),
            EbmlElement::uint(ElementId::TRACK_TYPE, self.track_type.matroska_value()),
            EbmlElement::uint(ElementId::FLAG_LACING, u64::from(self.lacing)),
            EbmlElement::string(ElementId::CODEC_ID, self.codec_id.clone()),
        ];

        if let Some(private) = &self.codec_private {
            children.push(EbmlElement::binary(ElementId::CODEC_PRIVATE, private.clone()));
        }
        if let Some(duration) = self.default_duration {
            children.push(EbmlElement::uint(ElementId::DEFAULT_DURATION, duration));
        }
        if let Some(language) = &self.language {
            children.push(EbmlElement::string(ElementId::LANGUAGE, language.clone()));
        }

        if let (TrackType::Video, Some(video)) = (self.track_type, &self.video) {
            let mut video_children = vec![
                EbmlElement::uint(ElementId::PIXEL_WIDTH, video.pixel_width),
                EbmlElement::uint(ElementId::PIXEL_HEIGHT, video.pixel_height),
            ];
            if let Some(mode) = video.stereo_mode {
                video_children.push(EbmlElement::uint(ElementId::STEREO_MODE, mode));
            }
            children.push(EbmlElement::master(ElementId::VIDEO, video_children));
        }

        if let (TrackType::Audio, Some(audio)) = (self.track_type, &self.audio) {
            children.push(EbmlElement::master(
                ElementId::AUDIO,
                vec![
                    EbmlElement::float(ElementId::SAMPLING_FREQUENCY, audio.sampling_frequency),
                    EbmlElement::uint(ElementId::CHANNELS, audio.channels),
                ],
            ));
        }

        EbmlElement::master(ElementId::TRACK_ENTRY, children)
    }
}

/// Running statistics for one track, kept across clusters and files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackStatistics {
    pub frames: u64,
    pub bytes: u64,
    pub min_timestamp: Option<i64>,
    pub max_end_timestamp: Option<i64>,
}

impl TrackStatistics {
    /// Account one frame.
    pub fn account(&mut self, timestamp: i64, duration: i64, bytes: usize) {
        self.frames += 1;
        self.bytes += bytes as u64;
        self.min_timestamp = Some(self.min_timestamp.map_or(timestamp, |t| t.min(timestamp)));
        let end = timestamp + duration.max(0);
        self.max_end_timestamp = Some(self.max_end_timestamp.map_or(end, |t| t.max(end)));
    }
}

/// A registered track plus its runtime state.
#[derive(Debug, Clone)]
pub struct Track {
    pub config: TrackConfig,
    /// Timestamp of the last cue point emitted for this track.
    pub last_cue_timestamp: Option<i64>,
    pub statistics: TrackStatistics,
}

/// All tracks of a mux session, keyed by track number.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<u64, Track>,
    order: Vec<u64>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track. Track numbers must be unique and non-zero.
    pub fn register(&mut self, config: TrackConfig) -> Result<()> {
        if config.number == 0 {
            return Err(Error::config("track number 0 is not allowed"));
        }
        if self.tracks.contains_key(&config.number) {
            return Err(Error::DuplicateTrack(config.number));
        }

        tracing::debug!(
            track = config.number,
            track_type = ?config.track_type,
            codec = %config.codec_id,
            "Registered track"
        );

        self.order.push(config.number);
        self.tracks.insert(
            config.number,
            Track {
                config,
                last_cue_timestamp: None,
                statistics: TrackStatistics::default(),
            },
        );
        Ok(())
    }

    pub fn get(&self, number: u64) -> Result<&Track> {
        self.tracks.get(&number).ok_or(Error::UnknownTrack(number))
    }

    pub fn get_mut(&mut self, number: u64) -> Result<&mut Track> {
        self.tracks.get_mut(&number).ok_or(Error::UnknownTrack(number))
    }

    pub fn contains(&self, number: u64) -> bool {
        self.tracks.contains_key(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().filter_map(|n| self.tracks.get(n))
    }

    /// The first registered video track.
    pub fn video_track(&self) -> Option<u64> {
        self.iter()
            .find(|t| t.config.track_type == TrackType::Video)
            .map(|t| t.config.number)
    }

    pub fn has_video(&self) -> bool {
        self.video_track().is_some()
    }

    /// Track that drives chapter generation: video over audio over
    /// anything else, first registered wins ties.
    pub fn reference_track(&self) -> Option<u64> {
        self.video_track()
            .or_else(|| {
                self.iter()
                    .find(|t| t.config.track_type == TrackType::Audio)
                    .map(|t| t.config.number)
            })
            .or_else(|| self.order.first().copied())
    }

    /// TrackEntry elements of all tracks, in registration order.
    pub fn to_element(&self) -> EbmlElement {
        EbmlElement::master(
            ElementId::TRACKS,
            self.iter().map(|t| t.config.to_element()).collect(),
        )
    }

    /// Statistics per track number.
    pub fn statistics(&self) -> BTreeMap<u64, TrackStatistics> {
        self.tracks
            .iter()
            .map(|(n, t)| (*n, t.statistics.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_track_priority() {
        let mut registry = TrackRegistry::new();
        registry
            .register(TrackConfig::new(1, TrackType::Subtitle, "S_TEXT/UTF8"))
            .unwrap();
        assert_eq!(registry.reference_track(), Some(1));

        registry
            .register(TrackConfig::new(2, TrackType::Audio, "A_OPUS"))
            .unwrap();
        registry
            .register(TrackConfig::new(3, TrackType::Audio, "A_AAC"))
            .unwrap();
        assert_eq!(registry.reference_track(), Some(2));

        registry
            .register(TrackConfig::new(4, TrackType::Video, "V_VP9"))
            .unwrap();
        registry
            .register(TrackConfig::new(5, TrackType::Video, "V_AV1"))
            .unwrap();
        assert_eq!(registry.reference_track(), Some(4));
        assert_eq!(registry.video_track(), Some(4));
    }

    #[test]
    fn test_duplicate_and_unknown_tracks() {
        let mut registry = TrackRegistry::new();
        registry
            .register(TrackConfig::new(1, TrackType::Video, "V_VP9"))
            .unwrap();
        assert!(matches!(
            registry.register(TrackConfig::new(1, TrackType::Audio, "A_OPUS")),
            Err(Error::DuplicateTrack(1))
        ));
        assert!(matches!(registry.get(7), Err(Error::UnknownTrack(7))));
        assert!(registry
            .register(TrackConfig::new(0, TrackType::Audio, "A_OPUS"))
            .is_err());
    }

    #[test]
    fn test_track_entry_element() {
        let config = TrackConfig::new(1, TrackType::Video, "V_MPEG4/ISO/AVC")
            .with_default_duration(40_000_000)
            .with_video(VideoSettings {
                pixel_width: 1920,
                pixel_height: 1080,
                stereo_mode: Some(1),
            });
        let entry = config.to_element();

        assert_eq!(entry.child_uint(ElementId::TRACK_NUMBER), Some(1));
        assert_eq!(entry.child_uint(ElementId::DEFAULT_DURATION), Some(40_000_000));
        let video = entry.child(ElementId::VIDEO).unwrap();
        assert_eq!(video.child_uint(ElementId::STEREO_MODE), Some(1));
        assert!(entry.child(ElementId::AUDIO).is_none());
    }

    #[test]
    fn test_statistics() {
        let mut stats = TrackStatistics::default();
        stats.account(40, 20, 100);
        stats.account(0, 40, 50);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes, 150);
        assert_eq!(stats.min_timestamp, Some(0));
        assert_eq!(stats.max_end_timestamp, Some(60));
    }
}
