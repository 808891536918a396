//! Frame intervals and node references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FarmError;

/// A half-open range `[start, end)` of global frame indices.
///
/// Across all jobs sharing the same (duration, sampling_step, node_count),
/// the union of intervals covers `[0, total_frames)` with no overlap and no
/// gap — the partitioning invariant the aggregator re-checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInterval {
    /// First global frame index in the interval.
    pub start: u32,
    /// One past the last global frame index.
    pub end: u32,
}

impl FrameInterval {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of frames in the interval.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index < self.end
    }

    /// Iterate the global indices in increasing order.
    pub fn indices(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

impl fmt::Display for FrameInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A node's 1-based position within the fleet, e.g. `3/4`.
///
/// Matches the worker CLI contract: `--node <index>/<count>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// 1-based node index.
    pub index: u32,
    /// Total number of nodes.
    pub count: u32,
}

impl NodeRef {
    pub fn new(index: u32, count: u32) -> Self {
        Self { index, count }
    }

    /// True when this is the last node in the fleet.
    pub fn is_last(&self) -> bool {
        self.index == self.count
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

impl FromStr for NodeRef {
    type Err = FarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, count) = s
            .split_once('/')
            .ok_or_else(|| FarmError::InvalidPartition(format!("bad node ref '{s}', want 'index/count'")))?;
        let index = index
            .trim()
            .parse::<u32>()
            .map_err(|_| FarmError::InvalidPartition(format!("bad node index in '{s}'")))?;
        let count = count
            .trim()
            .parse::<u32>()
            .map_err(|_| FarmError::InvalidPartition(format!("bad node count in '{s}'")))?;
        Ok(NodeRef { index, count })
    }
}

/// Conventional file name for a frame: `frame_<index:04>.png`.
///
/// Zero-padded so lexicographic order equals index order, which both the
/// reassembly step and the encoder's `%04d` input pattern rely on.
pub fn frame_file_name(index: u32) -> String {
    format!("frame_{index:04}.png")
}
