//! Seek head collaborator.
//!
//! The assembler reports every top-level element it writes (clusters, cues)
//! here; the file output turns the collected entries into SeekHead elements.

use mkvmux_ebml::{EbmlElement, ElementId};

/// One seek entry: element ID plus segment-relative position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekEntry {
    pub id: ElementId,
    pub position: u64,
}

impl SeekEntry {
    pub fn to_element(&self) -> EbmlElement {
        EbmlElement::master(
            ElementId::SEEK,
            vec![
                EbmlElement::binary(ElementId::SEEK_ID, self.id.to_bytes()),
                EbmlElement::uint(ElementId::SEEK_POSITION, self.position),
            ],
        )
    }
}

/// Receives "index this element" notifications.
pub trait SeekIndex {
    /// Record `id` at segment-relative `position`.
    fn index(&mut self, id: ElementId, position: u64);

    /// Hand out and forget all entries collected so far.
    fn take_entries(&mut self) -> Vec<SeekEntry>;
}

/// In-memory seek index.
#[derive(Debug, Default, Clone)]
pub struct SeekEntries {
    entries: Vec<SeekEntry>,
}

impl SeekEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SeekEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SeekIndex for SeekEntries {
    fn index(&mut self, id: ElementId, position: u64) {
        tracing::trace!(element = %id, position, "Seek entry");
        self.entries.push(SeekEntry { id, position });
    }

    fn take_entries(&mut self) -> Vec<SeekEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Build a SeekHead element from `entries`.
pub fn seek_head_element(entries: &[SeekEntry]) -> EbmlElement {
    EbmlElement::master(
        ElementId::SEEK_HEAD,
        entries.iter().map(SeekEntry::to_element).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_and_take() {
        let mut seek = SeekEntries::new();
        seek.index(ElementId::CLUSTER, 100);
        seek.index(ElementId::CUES, 900);
        assert_eq!(seek.len(), 2);

        let entries = seek.take_entries();
        assert!(seek.is_empty());

        let head = seek_head_element(&entries);
        let first = &head.children()[0];
        assert_eq!(
            first.child(ElementId::SEEK_ID).and_then(|e| e.as_binary()).map(|b| b.to_vec()),
            Some(ElementId::CLUSTER.to_bytes())
        );
        assert_eq!(first.child_uint(ElementId::SEEK_POSITION), Some(100));
    }
}
