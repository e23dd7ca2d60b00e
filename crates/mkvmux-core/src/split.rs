//! Split points.

use crate::{Error, Result};

/// What a split point's value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "snake_case"))]
pub enum SplitKind {
    /// Estimated output file size in bytes, repeating.
    Size,
    /// Duration of the current file in nanoseconds, repeating.
    Duration,
    /// Absolute timestamp in nanoseconds.
    Timestamp,
    /// Absolute timestamp boundary of a kept or discarded range.
    Parts,
    /// Frame/field number boundary of a kept or discarded range.
    PartsFrameField,
    /// Absolute frame/field number.
    FrameField,
}

/// One entry of the split point list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SplitPoint {
    pub point: i64,
    pub kind: SplitKind,
    /// Consumed once reached instead of repeating.
    pub use_once: bool,
    /// Content after this point is dropped until the next point.
    pub discard: bool,
    /// Reaching the point starts a new output file.
    pub create_new_file: bool,
}

impl SplitPoint {
    pub fn new(point: i64, kind: SplitKind, use_once: bool, discard: bool, create_new_file: bool) -> Self {
        Self {
            point,
            kind,
            use_once,
            discard,
            create_new_file,
        }
    }

    /// Start a new file every `bytes` bytes.
    pub fn size(bytes: i64) -> Self {
        Self::new(bytes, SplitKind::Size, false, false, true)
    }

    /// Start a new file every `duration` nanoseconds.
    pub fn duration(duration: i64) -> Self {
        Self::new(duration, SplitKind::Duration, false, false, true)
    }

    /// Start a new file at the absolute timestamp.
    pub fn timestamp(timestamp: i64) -> Self {
        Self::new(timestamp, SplitKind::Timestamp, true, false, true)
    }

    /// Start a new file at the absolute frame/field number.
    pub fn frame_field(number: i64) -> Self {
        Self::new(number, SplitKind::FrameField, true, false, true)
    }

    /// Whether the value counts frames rather than time or bytes.
    pub fn counts_frames(&self) -> bool {
        matches!(self.kind, SplitKind::FrameField | SplitKind::PartsFrameField)
    }

    /// Build the split points for a list of kept ranges.
    ///
    /// `frames` selects frame/field numbers instead of timestamps. Content
    /// outside the ranges is discarded; a range with `append` set continues
    /// the previous file instead of starting a new one.
    pub fn parts(ranges: &[PartRange], frames: bool) -> Result<Vec<SplitPoint>> {
        let kind = if frames {
            SplitKind::PartsFrameField
        } else {
            SplitKind::Parts
        };

        let mut points = Vec::with_capacity(ranges.len() * 2 + 1);
        let mut previous_end = 0;

        for (index, range) in ranges.iter().enumerate() {
            if range.start < previous_end || range.end.is_some_and(|end| end <= range.start) {
                return Err(Error::config(format!(
                    "split part {} ({}..{:?}) overlaps or is empty",
                    index + 1,
                    range.start,
                    range.end
                )));
            }
            if index > 0 && range.end.is_none() && index + 1 != ranges.len() {
                return Err(Error::config("only the last split part may be open-ended"));
            }

            if index == 0 {
                if range.start > 0 {
                    points.push(Self::new(0, kind, true, true, false));
                    points.push(Self::new(range.start, kind, true, false, false));
                }
            } else {
                points.push(Self::new(range.start, kind, true, false, !range.append));
            }

            if let Some(end) = range.end {
                points.push(Self::new(end, kind, true, true, false));
                previous_end = end;
            } else {
                previous_end = i64::MAX;
            }
        }

        Ok(points)
    }
}

/// A kept range for [`SplitPoint::parts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PartRange {
    pub start: i64,
    pub end: Option<i64>,
    /// Append to the previous part's file.
    #[cfg_attr(feature = "serialize", serde(default))]
    pub append: bool,
}

impl PartRange {
    pub fn new(start: i64, end: Option<i64>) -> Self {
        Self {
            start,
            end,
            append: false,
        }
    }

    pub fn appended(mut self) -> Self {
        self.append = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeating_and_once() {
        assert!(!SplitPoint::size(1 << 20).use_once);
        assert!(!SplitPoint::duration(60_000_000_000).use_once);
        assert!(SplitPoint::timestamp(10).use_once);
        assert!(SplitPoint::frame_field(100).counts_frames());
    }

    #[test]
    fn test_parts_from_ranges() {
        let points = SplitPoint::parts(
            &[
                PartRange::new(10, Some(20)),
                PartRange::new(30, Some(40)).appended(),
                PartRange::new(50, None),
            ],
            false,
        )
        .unwrap();

        let summary: Vec<_> = points
            .iter()
            .map(|p| (p.point, p.discard, p.create_new_file))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, true, false),
                (10, false, false),
                (20, true, false),
                (30, false, false),
                (40, true, false),
                (50, false, true),
            ]
        );
        assert!(points.iter().all(|p| p.use_once && p.kind == SplitKind::Parts));
    }

    #[test]
    fn test_parts_starting_at_zero() {
        let points = SplitPoint::parts(&[PartRange::new(0, Some(5))], true).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, SplitKind::PartsFrameField);
        assert!(points[0].discard);
    }

    #[test]
    fn test_parts_rejects_overlap() {
        assert!(SplitPoint::parts(
            &[PartRange::new(10, Some(20)), PartRange::new(15, Some(30))],
            false
        )
        .is_err());
        assert!(SplitPoint::parts(&[PartRange::new(10, Some(10))], false).is_err());
        assert!(SplitPoint::parts(
            &[PartRange::new(10, None), PartRange::new(20, None)],
            false
        )
        .is_err());
    }
}
