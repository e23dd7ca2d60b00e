//! Mux configuration.

use crate::block::BlockBlobMode;
use crate::chapters::{ChapterGeneration, DEFAULT_NAME_TEMPLATE};
use crate::split::{SplitKind, SplitPoint};
use crate::{Error, Result};

/// Default TimestampScale: one millisecond.
pub const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;

/// When a cluster is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct ClusterLimits {
    /// Longest time span of one cluster in nanoseconds.
    pub max_duration: i64,
    /// Most blocks in one cluster.
    pub max_blocks: usize,
    /// Most payload bytes in one cluster.
    pub max_content_size: u64,
    /// Start a new cluster at every video key frame but the first.
    pub new_cluster_on_video_key_frame: bool,
}

impl Default for ClusterLimits {
    fn default() -> Self {
        Self {
            max_duration: 5_000_000_000,
            max_blocks: 65_535,
            max_content_size: 1_500_000,
            new_cluster_on_video_key_frame: false,
        }
    }
}

/// Cue writing options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct CueSettings {
    pub enabled: bool,
    /// Write CueDuration for tracks that want it.
    pub durations: bool,
    /// Write CueRelativePosition.
    pub relative_positions: bool,
}

impl Default for CueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            durations: true,
            relative_positions: true,
        }
    }
}

/// Output splitting options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct SplitSettings {
    /// Split points, consumed in order.
    pub points: Vec<SplitPoint>,
    /// Keep timestamps continuous across files instead of restarting at 0.
    pub link_files: bool,
    /// Stop splitting once this many files exist.
    pub max_files: Option<usize>,
}

/// Chapter generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct ChapterSettings {
    pub mode: ChapterGeneration,
    pub name_template: String,
}

impl Default for ChapterSettings {
    fn default() -> Self {
        Self {
            mode: ChapterGeneration::None,
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
        }
    }
}

/// Everything that controls how packets are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct MuxConfig {
    /// Nanoseconds per timestamp unit.
    pub timestamp_scale: u64,
    pub doc_type: String,
    /// Highest DocType version the output may need.
    pub version_limit: Option<u64>,
    pub cluster: ClusterLimits,
    pub block_mode: BlockBlobMode,
    /// Lace frames of tracks that allow it.
    pub lacing: bool,
    /// Write BlockDuration whenever it differs from the default duration.
    pub use_durations: bool,
    pub cues: CueSettings,
    pub splitting: SplitSettings,
    pub chapters: ChapterSettings,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            timestamp_scale: DEFAULT_TIMESTAMP_SCALE,
            doc_type: "matroska".to_string(),
            version_limit: None,
            cluster: ClusterLimits::default(),
            block_mode: BlockBlobMode::default(),
            lacing: true,
            use_durations: false,
            cues: CueSettings::default(),
            splitting: SplitSettings::default(),
            chapters: ChapterSettings::default(),
        }
    }
}

impl MuxConfig {
    /// Timestamp scale as a signed divisor.
    pub fn scale(&self) -> i64 {
        self.timestamp_scale as i64
    }

    /// Whether any split point counts frames.
    pub fn splits_by_frames(&self) -> bool {
        self.splitting.points.iter().any(SplitPoint::counts_frames)
    }

    /// Block mode after applying the version limit; SimpleBlocks need
    /// DocType version 2.
    pub fn effective_block_mode(&self) -> BlockBlobMode {
        match self.version_limit {
            Some(limit) if limit < 2 => BlockBlobMode::NoSimple,
            _ => self.block_mode,
        }
    }

    /// Check the configuration for values the muxer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.timestamp_scale == 0 || self.timestamp_scale > i64::MAX as u64 {
            return Err(Error::config("timestamp_scale must be positive"));
        }
        if self.doc_type.is_empty() {
            return Err(Error::config("doc_type must not be empty"));
        }
        if self.version_limit == Some(0) {
            return Err(Error::config("version_limit must be at least 1"));
        }
        if self.cluster.max_duration <= 0 {
            return Err(Error::config("cluster.max_duration must be positive"));
        }
        if self.cluster.max_blocks == 0 {
            return Err(Error::config("cluster.max_blocks must be positive"));
        }
        if self.splitting.max_files == Some(0) {
            return Err(Error::config("splitting.max_files must be positive"));
        }
        if let ChapterGeneration::Interval(interval) = self.chapters.mode {
            if interval <= 0 {
                return Err(Error::config("chapter interval must be positive"));
            }
        }

        for point in &self.splitting.points {
            let repeating = matches!(point.kind, SplitKind::Size | SplitKind::Duration);
            if repeating && point.point <= 0 {
                return Err(Error::config(format!(
                    "{:?} split point must be positive, got {}",
                    point.kind, point.point
                )));
            }
            if point.point < 0 {
                return Err(Error::config(format!(
                    "split point must not be negative, got {}",
                    point.point
                )));
            }
        }

        let once: Vec<i64> = self
            .splitting
            .points
            .iter()
            .filter(|p| p.use_once)
            .map(|p| p.point)
            .collect();
        if once.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::config("split points must be in increasing order"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MuxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scale(), 1_000_000);
        assert_eq!(config.cluster.max_content_size, 1_500_000);
        assert_eq!(config.effective_block_mode(), BlockBlobMode::SimpleAuto);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = MuxConfig {
            timestamp_scale: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.timestamp_scale = DEFAULT_TIMESTAMP_SCALE;
        config.splitting.points = vec![SplitPoint::size(0)];
        assert!(config.validate().is_err());

        config.splitting.points = vec![SplitPoint::timestamp(20), SplitPoint::timestamp(10)];
        assert!(config.validate().is_err());

        config.splitting.points = vec![SplitPoint::frame_field(10)];
        assert!(config.validate().is_ok());
        assert!(config.splits_by_frames());
    }

    #[test]
    fn test_version_limit_disables_simple_blocks() {
        let config = MuxConfig {
            version_limit: Some(1),
            ..Default::default()
        };
        assert_eq!(config.effective_block_mode(), BlockBlobMode::NoSimple);
    }
}
