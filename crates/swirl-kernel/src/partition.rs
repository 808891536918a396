//! Frame-range partitioning — which global frames a node owns.
//!
//! The arithmetic truncates the *per-node* step count before multiplying by
//! the node position. Reordering the division and multiplication moves
//! boundary frames, so the order here is load-bearing: every node and the
//! coordinator must agree on it byte for byte.

use swirl_types::{FarmError, FarmResult, FrameInterval, NodeRef};

/// What to do with the trailing remainder when `duration` does not divide
/// evenly by `sampling_step * node_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemainderPolicy {
    /// The last node absorbs the remainder, so the union of intervals always
    /// covers `[0, total_frames)`.
    #[default]
    ExtendLast,
    /// Truncating arithmetic as-is; the trailing frames are assigned to no
    /// node and surface as an aggregation gap.
    Truncate,
}

/// Global frame count for a run: `floor(duration / sampling_step)`.
///
/// Derived, never stored — recomputed identically on every node so the
/// coordinator and the workers cannot drift.
pub fn total_frames(duration: f64, sampling_step: f64) -> FarmResult<u32> {
    check_timing(duration, sampling_step)?;
    Ok((duration / sampling_step) as u32)
}

/// Compute the half-open interval of global frame indices owned by `node`.
pub fn partition(
    node: NodeRef,
    duration: f64,
    sampling_step: f64,
    policy: RemainderPolicy,
) -> FarmResult<FrameInterval> {
    check_timing(duration, sampling_step)?;
    if node.count == 0 {
        return Err(FarmError::InvalidPartition("node count must be >= 1".into()));
    }
    if node.index == 0 || node.index > node.count {
        return Err(FarmError::InvalidPartition(format!(
            "node index {} outside 1..={}",
            node.index, node.count
        )));
    }

    // Truncate the per-node step count, then multiply by the node position.
    let task_duration = duration / node.count as f64;
    let per_node = (task_duration / sampling_step) as u32;
    let start = per_node * (node.index - 1);
    let mut end = start + per_node;

    if policy == RemainderPolicy::ExtendLast && node.is_last() {
        end = total_frames(duration, sampling_step)?;
    }

    Ok(FrameInterval::new(start, end))
}

fn check_timing(duration: f64, sampling_step: f64) -> FarmResult<()> {
    if !(duration > 0.0) {
        return Err(FarmError::InvalidPartition(format!(
            "duration must be positive, got {duration}"
        )));
    }
    if !(sampling_step > 0.0) {
        return Err(FarmError::InvalidPartition(format!(
            "sampling step must be positive, got {sampling_step}"
        )));
    }
    Ok(())
}
