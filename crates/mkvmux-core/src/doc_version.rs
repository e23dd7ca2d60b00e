//! DocType version tracking.
//!
//! Every element the muxer writes passes through the tracker, which raises
//! the (version, read version) pair the EBML head must declare. When a file
//! is finished, [`DocTypeVersionTracker::update_ebml_head`] patches the head
//! written at the start of the file in place.

use std::io::{Read, Seek, SeekFrom, Write};

use mkvmux_ebml::{read_element, read_element_header, EbmlElement, ElementId, ElementSink};

use crate::Result;

/// Outcome of patching the EBML head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadUpdateResult {
    /// The stored versions were already high enough.
    NoUpdateNeeded,
    /// The head was rewritten in place.
    Updated,
    /// No EBML head at the start of the file.
    NoHeadFound,
    /// The new head does not fit into the space of the old one.
    NotEnoughSpace,
    /// Reading or writing the file failed.
    ReadWriteFailure,
}

/// Minimum (version, read version) needed by an element ID.
fn required_versions(id: ElementId) -> Option<(u64, u64)> {
    let versions = match id {
        ElementId::SIMPLE_BLOCK => (2, 2),
        ElementId::CODEC_STATE | ElementId::CUE_CODEC_STATE => (2, 1),

        ElementId::ALPHA_MODE | ElementId::TRACK_OPERATION => (3, 1),

        ElementId::CODEC_DELAY
        | ElementId::SEEK_PRE_ROLL
        | ElementId::DISCARD_PADDING
        | ElementId::CUE_DURATION
        | ElementId::CUE_RELATIVE_POSITION
        | ElementId::COLOUR
        | ElementId::PROJECTION
        | ElementId::BLOCK_ADDITION_MAPPING
        | ElementId::BLOCK_ADD_ID_VALUE
        | ElementId::BLOCK_ADD_ID_NAME
        | ElementId::BLOCK_ADD_ID_TYPE
        | ElementId::BLOCK_ADD_ID_EXTRA_DATA
        | ElementId::LANGUAGE_BCP47
        | ElementId::CHAP_LANGUAGE_BCP47
        | ElementId::TAG_LANGUAGE_BCP47
        | ElementId::FLAG_HEARING_IMPAIRED
        | ElementId::FLAG_VISUAL_IMPAIRED
        | ElementId::FLAG_TEXT_DESCRIPTIONS
        | ElementId::FLAG_ORIGINAL
        | ElementId::FLAG_COMMENTARY => (4, 1),

        ElementId::EDITION_DISPLAY
        | ElementId::EDITION_STRING
        | ElementId::EDITION_LANGUAGE_IETF
        | ElementId::CHAPTER_SKIP_TYPE => (5, 1),

        _ => return None,
    };
    Some(versions)
}

/// Version needed because of the element's value rather than its ID.
fn value_dependent_version(element: &EbmlElement) -> Option<u64> {
    match element.id {
        ElementId::STEREO_MODE => element.as_uint().filter(|v| *v != 0).map(|_| 3),
        _ => None,
    }
}

/// Running DocType (version, read version) of one output file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTypeVersionTracker {
    version: u64,
    read_version: u64,
    version_limit: Option<u64>,
}

impl Default for DocTypeVersionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DocTypeVersionTracker {
    pub fn new() -> Self {
        Self {
            version: 1,
            read_version: 1,
            version_limit: None,
        }
    }

    /// Restrict output to elements allowed at `limit`; others are pruned
    /// when rendered.
    pub fn with_version_limit(mut self, limit: Option<u64>) -> Self {
        self.version_limit = limit;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    pub fn version_limit(&self) -> Option<u64> {
        self.version_limit
    }

    fn raise(&mut self, id: ElementId, version: u64, read_version: u64) {
        if version > self.version {
            tracing::debug!(element = %id, from = self.version, to = version, "Raising DocTypeVersion");
            self.version = version;
        }
        if read_version > self.read_version {
            tracing::debug!(
                element = %id,
                from = self.read_version,
                to = read_version,
                "Raising DocTypeReadVersion"
            );
            self.read_version = read_version;
        }
    }

    /// Raise the versions for `element` and all of its children.
    ///
    /// Elements holding their default value are skipped unless `strict`.
    pub fn account(&mut self, element: &EbmlElement, strict: bool) {
        if !strict && element.is_default() {
            return;
        }

        if let Some((version, read_version)) = required_versions(element.id) {
            self.raise(element.id, version, read_version);
        }
        if let Some(version) = value_dependent_version(element) {
            self.raise(element.id, version, 1);
        }

        for child in element.children() {
            self.account(child, strict);
        }
    }

    /// Remove children that need a newer version than the configured limit.
    pub fn prune(&self, element: &mut EbmlElement) {
        let Some(limit) = self.version_limit else {
            return;
        };
        prune_above(element, limit);
    }

    /// Prune, account and write `element`, returning the bytes written.
    pub fn render<S: ElementSink + ?Sized>(
        &mut self,
        element: &mut EbmlElement,
        sink: &mut S,
        strict: bool,
    ) -> Result<u64> {
        self.prune(element);
        let written = sink.write_element(element)?;
        self.account(element, strict);
        Ok(written)
    }

    /// Build the EBML head declaring the current versions.
    pub fn ebml_head(&self, doc_type: &str) -> EbmlElement {
        EbmlElement::master(
            ElementId::EBML,
            vec![
                EbmlElement::uint(ElementId::EBML_VERSION, 1),
                EbmlElement::uint(ElementId::EBML_READ_VERSION, 1),
                EbmlElement::uint(ElementId::EBML_MAX_ID_LENGTH, 4),
                EbmlElement::uint(ElementId::EBML_MAX_SIZE_LENGTH, 8),
                EbmlElement::string(ElementId::DOC_TYPE, doc_type),
                EbmlElement::uint(ElementId::DOC_TYPE_VERSION, self.version),
                EbmlElement::uint(ElementId::DOC_TYPE_READ_VERSION, self.read_version),
            ],
        )
    }

    /// Rewrite the EBML head at the start of `file` if it declares lower
    /// versions than the tracked ones.
    ///
    /// The head may use its own bytes plus an immediately following Void
    /// element; nothing after that is ever moved. The file position is
    /// restored afterwards.
    pub fn update_ebml_head<F: Read + Write + Seek + ?Sized>(&self, file: &mut F) -> HeadUpdateResult {
        let Ok(saved) = file.stream_position() else {
            return HeadUpdateResult::ReadWriteFailure;
        };

        let result = self.patch_head(file);

        if file.seek(SeekFrom::Start(saved)).is_err() {
            return HeadUpdateResult::ReadWriteFailure;
        }

        tracing::debug!(
            ?result,
            version = self.version,
            read_version = self.read_version,
            "EBML head update"
        );
        result
    }

    fn patch_head<F: Read + Write + Seek + ?Sized>(&self, file: &mut F) -> HeadUpdateResult {
        if file.seek(SeekFrom::Start(0)).is_err() {
            return HeadUpdateResult::ReadWriteFailure;
        }

        let mut head = match read_element(file) {
            Ok(head) if head.id == ElementId::EBML => head,
            Ok(_) => return HeadUpdateResult::NoHeadFound,
            Err(mkvmux_ebml::Error::Io(e)) if e.kind() != std::io::ErrorKind::UnexpectedEof => {
                return HeadUpdateResult::ReadWriteFailure
            }
            Err(_) => return HeadUpdateResult::NoHeadFound,
        };

        let stored_version = head.child_uint(ElementId::DOC_TYPE_VERSION).unwrap_or(1);
        let stored_read_version = head.child_uint(ElementId::DOC_TYPE_READ_VERSION).unwrap_or(1);
        if stored_version >= self.version && stored_read_version >= self.read_version {
            return HeadUpdateResult::NoUpdateNeeded;
        }

        let mut available = head.total_size();
        if let Ok(next) = read_element_header(file) {
            if next.id == ElementId::VOID {
                available += next.total_size().unwrap_or(0);
            }
        }

        let Some(children) = head.children_mut() else {
            return HeadUpdateResult::NoHeadFound;
        };
        set_uint_child(
            children,
            ElementId::DOC_TYPE_VERSION,
            stored_version.max(self.version),
        );
        set_uint_child(
            children,
            ElementId::DOC_TYPE_READ_VERSION,
            stored_read_version.max(self.read_version),
        );

        let encoded = match head.encode_into_space(available) {
            Ok(Some(encoded)) => encoded,
            Ok(None) | Err(_) => return HeadUpdateResult::NotEnoughSpace,
        };

        if file.seek(SeekFrom::Start(0)).is_err() || file.write_all(&encoded).is_err() {
            return HeadUpdateResult::ReadWriteFailure;
        }
        if file.flush().is_err() {
            return HeadUpdateResult::ReadWriteFailure;
        }

        HeadUpdateResult::Updated
    }
}

fn set_uint_child(children: &mut Vec<EbmlElement>, id: ElementId, value: u64) {
    match children.iter_mut().find(|c| c.id == id) {
        Some(child) => *child = EbmlElement::uint(id, value),
        None => children.push(EbmlElement::uint(id, value)),
    }
}

fn prune_above(element: &mut EbmlElement, limit: u64) {
    let Some(children) = element.children_mut() else {
        return;
    };
    children.retain(|child| {
        let allowed = required_versions(child.id).map_or(true, |(version, _)| version <= limit);
        if !allowed {
            tracing::trace!(element = %child.id, limit, "Pruning element above version limit");
        }
        allowed
    });
    for child in children.iter_mut() {
        prune_above(child, limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn head_with(children: Vec<EbmlElement>) -> EbmlElement {
        EbmlElement::master(ElementId::EBML, children)
    }

    #[test]
    fn test_account_table_and_idempotence() {
        let mut tracker = DocTypeVersionTracker::new();
        let block = EbmlElement::binary(ElementId::SIMPLE_BLOCK, vec![0x81, 0, 0, 0x80]);
        tracker.account(&block, false);
        assert_eq!((tracker.version(), tracker.read_version()), (2, 2));

        tracker.account(&block, false);
        assert_eq!((tracker.version(), tracker.read_version()), (2, 2));

        let cues = EbmlElement::master(
            ElementId::CUE_TRACK_POSITIONS,
            vec![EbmlElement::uint(ElementId::CUE_DURATION, 3)],
        );
        tracker.account(&cues, false);
        assert_eq!((tracker.version(), tracker.read_version()), (4, 2));

        // Never lowered.
        tracker.account(&block, false);
        assert_eq!(tracker.version(), 4);
    }

    #[test]
    fn test_stereo_mode_special_case() {
        let mut tracker = DocTypeVersionTracker::new();
        tracker.account(&EbmlElement::uint(ElementId::STEREO_MODE, 0), true);
        assert_eq!(tracker.version(), 1);

        tracker.account(&EbmlElement::uint(ElementId::STEREO_MODE, 1), false);
        assert_eq!(tracker.version(), 3);
    }

    #[test]
    fn test_default_values_skipped_unless_strict() {
        let mut tracker = DocTypeVersionTracker::new();
        let delay = EbmlElement::uint(ElementId::CODEC_DELAY, 0);
        tracker.account(&delay, false);
        assert_eq!(tracker.version(), 1);

        tracker.account(&delay, true);
        assert_eq!(tracker.version(), 4);
    }

    #[test]
    fn test_render_prunes_above_limit() {
        let mut tracker = DocTypeVersionTracker::new().with_version_limit(Some(2));
        let mut positions = EbmlElement::master(
            ElementId::CUE_TRACK_POSITIONS,
            vec![
                EbmlElement::uint(ElementId::CUE_TRACK, 1),
                EbmlElement::uint(ElementId::CUE_CLUSTER_POSITION, 10),
                EbmlElement::uint(ElementId::CUE_RELATIVE_POSITION, 3),
            ],
        );

        let mut out = Cursor::new(Vec::new());
        let written = tracker.render(&mut positions, &mut out, false).unwrap();
        assert_eq!(positions.children().len(), 2);
        assert_eq!(written, positions.total_size());
        assert_eq!(tracker.version(), 1);
    }

    #[test]
    fn test_update_head_in_place() {
        let written = DocTypeVersionTracker::new();
        let mut raised = written.clone();
        raised.version = 2;
        raised.read_version = 2;

        let mut file = Cursor::new(Vec::new());
        raised
            .ebml_head("matroska")
            .encode(file.get_mut())
            .unwrap();
        file.get_mut().extend_from_slice(&[0x18, 0x53, 0x80, 0x67]);
        file.set_position(4);

        let mut tracker = DocTypeVersionTracker::new();
        tracker.account(&EbmlElement::uint(ElementId::CUE_DURATION, 1), false);

        let before = file.get_ref().len();
        assert_eq!(tracker.update_ebml_head(&mut file), HeadUpdateResult::Updated);
        assert_eq!(file.position(), 4);
        assert_eq!(file.get_ref().len(), before);

        file.set_position(0);
        let head = read_element(&mut file).unwrap();
        assert_eq!(head.child_uint(ElementId::DOC_TYPE_VERSION), Some(4));
        assert_eq!(head.child_uint(ElementId::DOC_TYPE_READ_VERSION), Some(2));

        assert_eq!(
            tracker.update_ebml_head(&mut file),
            HeadUpdateResult::NoUpdateNeeded
        );
    }

    #[test]
    fn test_update_head_uses_following_void() {
        let mut bytes = head_with(vec![EbmlElement::string(ElementId::DOC_TYPE, "webm")])
            .to_bytes()
            .unwrap()
            .to_vec();
        bytes.extend_from_slice(&EbmlElement::void(20).unwrap().to_bytes().unwrap());
        bytes.extend_from_slice(&[0x18, 0x53, 0x80, 0x67]);
        let total = bytes.len();
        let mut file = Cursor::new(bytes);

        let mut tracker = DocTypeVersionTracker::new();
        tracker.account(&EbmlElement::binary(ElementId::SIMPLE_BLOCK, vec![0]), false);
        assert_eq!(tracker.update_ebml_head(&mut file), HeadUpdateResult::Updated);

        let bytes = file.into_inner();
        assert_eq!(bytes.len(), total);
        assert_eq!(&bytes[total - 4..], &[0x18, 0x53, 0x80, 0x67]);
    }

    #[test]
    fn test_update_head_not_enough_space() {
        let mut bytes = head_with(vec![EbmlElement::string(ElementId::DOC_TYPE, "matroska")])
            .to_bytes()
            .unwrap()
            .to_vec();
        bytes.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x01]);
        let original = bytes.clone();
        let mut file = Cursor::new(bytes);

        let mut tracker = DocTypeVersionTracker::new();
        tracker.account(&EbmlElement::binary(ElementId::SIMPLE_BLOCK, vec![0]), false);
        tracker.account(&EbmlElement::int(ElementId::DISCARD_PADDING, 5), false);

        assert_eq!(
            tracker.update_ebml_head(&mut file),
            HeadUpdateResult::NotEnoughSpace
        );
        assert_eq!(file.get_ref(), &original);
    }

    #[test]
    fn test_update_head_missing() {
        let mut file = Cursor::new(vec![0x18, 0x53, 0x80, 0x67, 0x80]);
        let mut tracker = DocTypeVersionTracker::new();
        tracker.account(&EbmlElement::binary(ElementId::SIMPLE_BLOCK, vec![0]), false);
        assert_eq!(
            tracker.update_ebml_head(&mut file),
            HeadUpdateResult::NoHeadFound
        );

        let mut empty = Cursor::new(Vec::new());
        assert_eq!(
            tracker.update_ebml_head(&mut empty),
            HeadUpdateResult::NoHeadFound
        );
    }
}
