//! Job specification and per-node run results.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::interval::{FrameInterval, NodeRef};

/// Everything one node needs to render its slice of the animation.
///
/// Immutable once created; one instance is dispatched per node. The seed is
/// an explicit field so that every node derives bit-identical initial
/// conditions without relying on process-global RNG state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// This node's position in the fleet.
    pub node: NodeRef,
    /// Total simulated time in seconds.
    pub duration: f64,
    /// Sampling step in seconds; one frame per sample.
    pub sampling_step: f64,
    /// Number of trajectories in the ensemble.
    pub trajectory_count: usize,
    /// Shared RNG seed for initial conditions.
    pub seed: u64,
    /// Directory the retrieved frames land in.
    pub output_dir: PathBuf,
}

/// Terminal state of one dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every frame in the node's interval was retrieved.
    Success,
    /// Some frames were retrieved; the rest appear as gaps.
    PartialFailure,
    /// Nothing retrievable from this node.
    Fatal,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::PartialFailure => write!(f, "partial failure"),
            RunStatus::Fatal => write!(f, "fatal"),
        }
    }
}

/// Outcome of one node's dispatch: which frames actually came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub job: JobSpec,
    /// The interval the node was assigned.
    pub interval: FrameInterval,
    /// Global indices whose frame files were retrieved.
    pub frames_returned: BTreeSet<u32>,
    /// The node's log, as retrieved (empty if the log itself was lost).
    pub log: String,
    pub status: RunStatus,
}

impl RunResult {
    /// Classify a finished job from its retrieved indices.
    pub fn classify(
        job: JobSpec,
        interval: FrameInterval,
        frames_returned: BTreeSet<u32>,
        log: String,
    ) -> Self {
        // An empty interval owes nothing; more nodes than frames is legal.
        let status = if frames_returned.len() as u32 == interval.len() {
            RunStatus::Success
        } else if frames_returned.is_empty() {
            RunStatus::Fatal
        } else {
            RunStatus::PartialFailure
        };
        Self {
            job,
            interval,
            frames_returned,
            log,
            status,
        }
    }

    /// A job that produced nothing at all (crash, timeout, abort).
    pub fn fatal(job: JobSpec, interval: FrameInterval, log: String) -> Self {
        Self {
            job,
            interval,
            frames_returned: BTreeSet::new(),
            log,
            status: RunStatus::Fatal,
        }
    }

    /// Indices of this node's interval that never came back.
    pub fn missing(&self) -> Vec<u32> {
        self.interval
            .indices()
            .filter(|i| !self.frames_returned.contains(i))
            .collect()
    }
}
