//! Clusters.
//!
//! A [`Cluster`] collects block blobs while it is open. Sealing it fixes the
//! base timestamp, resolves every blob against it and hands the blobs out as
//! shared references, since cue postprocessing and statistics still look at
//! them after the cluster itself is gone.

use std::sync::Arc;

use mkvmux_ebml::{EbmlElement, ElementId};

use crate::block::BlockBlob;
use crate::{Error, Result};

/// An open cluster.
#[derive(Debug, Default)]
pub struct Cluster {
    blobs: Vec<BlockBlob>,
    previous_size: Option<u64>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster that records the size of its predecessor.
    pub fn with_previous_size(previous_size: Option<u64>) -> Self {
        Self {
            blobs: Vec::new(),
            previous_size,
        }
    }

    pub fn add_blob(&mut self, blob: BlockBlob) {
        self.blobs.push(blob);
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn blobs(&self) -> &[BlockBlob] {
        &self.blobs
    }

    /// Fix the base timestamp and resolve all blobs.
    ///
    /// ClusterTimestamp is unsigned, so a block before 0 is an error.
    pub fn seal(self, scale: i64) -> Result<SealedCluster> {
        let base = self
            .blobs
            .iter()
            .map(|b| b.timestamp().div_euclid(scale))
            .min()
            .ok_or_else(|| Error::invariant("sealing an empty cluster"))?;
        if base < 0 {
            return Err(Error::invariant(format!(
                "cluster timestamp {} before the start of the file",
                base
            )));
        }

        let mut blobs = Vec::with_capacity(self.blobs.len());
        for mut blob in self.blobs {
            blob.resolve(base, scale)?;
            blobs.push(Arc::new(blob));
        }

        Ok(SealedCluster {
            base,
            scale,
            blobs,
            previous_size: self.previous_size,
        })
    }
}

/// A cluster whose blobs are resolved and ready to be written.
#[derive(Debug, Clone)]
pub struct SealedCluster {
    base: i64,
    scale: i64,
    blobs: Vec<Arc<BlockBlob>>,
    previous_size: Option<u64>,
}

impl SealedCluster {
    /// Cluster timestamp in timestamp-scale units.
    pub fn base(&self) -> i64 {
        self.base
    }

    /// Cluster timestamp in nanoseconds.
    pub fn base_timestamp(&self) -> i64 {
        self.base * self.scale
    }

    pub fn blobs(&self) -> &[Arc<BlockBlob>] {
        &self.blobs
    }

    /// Build the Cluster element.
    pub fn to_element(&self) -> Result<EbmlElement> {
        let mut children = Vec::with_capacity(self.blobs.len() + 2);
        children.push(EbmlElement::uint(
            ElementId::CLUSTER_TIMESTAMP,
            self.base as u64,
        ));
        if let Some(previous) = self.previous_size {
            children.push(EbmlElement::uint(ElementId::CLUSTER_PREV_SIZE, previous));
        }
        for blob in &self.blobs {
            children.push(blob.to_element()?);
        }
        Ok(EbmlElement::master(ElementId::CLUSTER, children))
    }

    /// Physical layout of `element` (as returned by [`Self::to_element`] and
    /// possibly pruned) written at segment-relative `position`.
    pub fn layout(&self, position: u64, element: &EbmlElement) -> ClusterLayout {
        let data_start = position + element.header_size();
        let mut offset = 0;
        let mut blobs = self.blobs.iter();
        let mut blocks = Vec::with_capacity(self.blobs.len());

        for child in element.children() {
            if matches!(child.id, ElementId::SIMPLE_BLOCK | ElementId::BLOCK_GROUP) {
                if let Some(blob) = blobs.next() {
                    let codec_state_position = codec_state_offset(child)
                        .map(|inner| data_start + offset + child.header_size() + inner);
                    blocks.push(BlockPosition {
                        track: blob.track(),
                        timestamp: blob.timestamp(),
                        relative_position: offset,
                        codec_state_position,
                    });
                }
            }
            offset += child.total_size();
        }

        ClusterLayout {
            position,
            data_start,
            size: element.total_size(),
            blocks,
        }
    }
}

fn codec_state_offset(group: &EbmlElement) -> Option<u64> {
    let mut offset = 0;
    for child in group.children() {
        if child.id == ElementId::CODEC_STATE {
            return Some(offset);
        }
        offset += child.total_size();
    }
    None
}

/// Where one block ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPosition {
    pub track: u64,
    /// Absolute block timestamp in nanoseconds.
    pub timestamp: i64,
    /// Offset of the block element from the cluster's data start.
    pub relative_position: u64,
    /// Segment-relative position of the block's CodecState element.
    pub codec_state_position: Option<u64>,
}

/// Physical layout of a written cluster, segment-relative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterLayout {
    pub position: u64,
    pub data_start: u64,
    pub size: u64,
    pub blocks: Vec<BlockPosition>,
}
