//! Error taxonomy shared across the farm.
//!
//! Per-node failures are recorded, never fatal to the whole run; only the
//! aggregator decides whether accumulated failures fail the run. Variants
//! carry `String` payloads so results stay `Clone`-able across task
//! boundaries.

use thiserror::Error;

/// Result type for farm operations.
pub type FarmResult<T> = Result<T, FarmError>;

/// Farm operation errors.
#[derive(Debug, Clone, Error)]
pub enum FarmError {
    /// Bad node/duration/step parameters. Fatal: the caller must not dispatch.
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    /// A node's remote program crashed or timed out. Recorded per node.
    #[error("remote execution failed on node {node}: {reason}")]
    RemoteExecution { node: u32, reason: String },

    /// Fewer frame files retrieved than the node's interval implies.
    #[error("node {node} returned {got} of {want} frames")]
    IncompleteTransfer { node: u32, got: usize, want: usize },

    /// The same frame index came back from more than one node.
    /// Hard invariant violation — never silently overwritten.
    #[error("frame {index} returned by more than one node")]
    OverlappingFrames { index: u32 },

    /// The union of retrieved indices has holes.
    #[error("aggregation gap: {} frame(s) missing, first at {first}", .missing.len())]
    AggregationGap { missing: Vec<u32>, first: u32 },

    /// The external encoder exited non-zero. Surfaced, never retried.
    #[error("encoder exited with status {status}")]
    Encoding { status: i32 },

    /// Frame rendering failed.
    #[error("render error: {0}")]
    Render(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FarmError {
    fn from(err: std::io::Error) -> Self {
        FarmError::Io(err.to_string())
    }
}

impl FarmError {
    /// Build an `AggregationGap` from the sorted list of missing indices.
    ///
    /// Panics if `missing` is empty — an empty gap is not an error.
    pub fn gap(missing: Vec<u32>) -> Self {
        let first = missing[0];
        FarmError::AggregationGap { missing, first }
    }
}
