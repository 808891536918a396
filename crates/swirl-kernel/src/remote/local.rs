//! Process-spawning executor — the local stand-in for the remote platform.
//!
//! Each node gets a scratch directory under a common root; uploads and
//! downloads are file copies, and `run` spawns the program with the sandbox
//! as its working directory. This keeps the whole pipeline executable and
//! testable on one machine while the dispatcher stays oblivious to where
//! the nodes actually live.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{RemoteError, RemoteExecutor, RemoteResult};

pub struct LocalExecutor {
    root: PathBuf,
}

impl LocalExecutor {
    /// `root` holds one `node-<index>` sandbox per node.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sandbox(&self, node: u32) -> PathBuf {
        self.root.join(format!("node-{node}"))
    }

    fn resolve(&self, node: u32, remote: &str) -> PathBuf {
        self.sandbox(node).join(remote)
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn upload(&self, node: u32, local: &Path, remote: &str) -> RemoteResult<()> {
        let dest = self.resolve(node, remote);
        let upload_err = |reason: String| RemoteError::Upload {
            path: remote.to_string(),
            reason,
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| upload_err(e.to_string()))?;
        }
        tokio::fs::copy(local, &dest)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        debug!(node, remote, "uploaded {}", local.display());
        Ok(())
    }

    async fn run(&self, node: u32, program: &str, args: &[String]) -> RemoteResult<()> {
        let sandbox = self.sandbox(node);
        let output = Command::new(sandbox.join(program))
            .args(args)
            .current_dir(&sandbox)
            .output()
            .await
            .map_err(|e| RemoteError::Exec(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemoteError::Exec(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!(node, program, "remote program finished");
        Ok(())
    }

    async fn download(&self, node: u32, remote: &str, local: &Path) -> RemoteResult<()> {
        let src = self.resolve(node, remote);
        let download_err = |reason: String| RemoteError::Download {
            path: remote.to_string(),
            reason,
        };
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| download_err(e.to_string()))?;
        }
        tokio::fs::copy(&src, local)
            .await
            .map_err(|e| download_err(e.to_string()))?;
        Ok(())
    }
}
