//! The aggregator's output contract.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An ordered, validated frame sequence ready for encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationManifest {
    /// Expected global frame count, `floor(duration / sampling_step)`.
    pub total_frames: u32,
    /// Frame file paths in global index order.
    pub frames: Vec<PathBuf>,
    /// Indices absent from every node's results. Empty unless the run was
    /// aggregated under a gap-tolerant policy.
    pub missing: Vec<u32>,
}

impl AnimationManifest {
    /// True when every expected frame is present.
    pub fn complete(&self) -> bool {
        self.missing.is_empty() && self.frames.len() as u32 == self.total_frames
    }
}
