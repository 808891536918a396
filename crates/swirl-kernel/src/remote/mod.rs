//! The remote execution boundary.
//!
//! The actual platform (task queueing, VM provisioning, transport) is an
//! external collaborator; the farm consumes it through this trait only.
//! Remote paths are sandbox-relative (`work/…`, `output/…`) — each node owns
//! one sandbox and never sees another node's files. Commands are a program
//! plus a typed argument vector; there is no shell string anywhere on this
//! boundary.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub mod local;
pub mod testing;

pub use local::LocalExecutor;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures at the remote boundary. All of these are per-node and recorded;
/// none of them may abort other nodes' work.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("upload of {path} failed: {reason}")]
    Upload { path: String, reason: String },
    #[error("remote execution failed: {0}")]
    Exec(String),
    #[error("download of {path} failed: {reason}")]
    Download { path: String, reason: String },
}

/// One remote execution slot per node, addressed by node index.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Ship a local file into the node's sandbox.
    async fn upload(&self, node: u32, local: &Path, remote: &str) -> RemoteResult<()>;

    /// Run a program inside the node's sandbox with a typed argument vector,
    /// waiting for completion.
    async fn run(&self, node: u32, program: &str, args: &[String]) -> RemoteResult<()>;

    /// Retrieve a file from the node's sandbox.
    async fn download(&self, node: u32, remote: &str, local: &Path) -> RemoteResult<()>;
}
