//! Test utilities for the remote boundary.
//!
//! `MockExecutor` scripts per-node behavior (frames to withhold, execution
//! failures, artificial latency) and counts calls, so dispatcher tests can
//! exercise partial-failure and retry paths without spawning processes.
//! Frames only become downloadable after the node has had one successful
//! `run` — a node that never ran produced nothing.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{RemoteError, RemoteExecutor, RemoteResult};

/// Scripted behavior for one node.
#[derive(Debug, Clone, Default)]
pub struct NodeScript {
    /// Frame indices whose download always fails (simulated lost transfer).
    pub withhold: BTreeSet<u32>,
    /// Number of `run` calls that fail before one succeeds. Use
    /// `usize::MAX` for a node that never comes up.
    pub failing_runs: usize,
    /// Fail the log download too.
    pub withhold_log: bool,
    /// Sleep this long inside `run` (for timeout tests).
    pub delay: Option<Duration>,
}

/// Mock executor with per-node scripts and call counting.
#[derive(Default)]
pub struct MockExecutor {
    scripts: HashMap<u32, NodeScript>,
    runs_seen: Mutex<HashMap<u32, usize>>,
    pub uploads: AtomicUsize,
    pub runs: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `node`'s behavior; unscripted nodes succeed completely.
    pub fn script(mut self, node: u32, script: NodeScript) -> Self {
        self.scripts.insert(node, script);
        self
    }

    fn script_for(&self, node: u32) -> NodeScript {
        self.scripts.get(&node).cloned().unwrap_or_default()
    }

    /// True once `node` has had a successful `run`.
    fn ran_ok(&self, node: u32) -> bool {
        let seen = *self.runs_seen.lock().unwrap().get(&node).unwrap_or(&0);
        seen > self.script_for(node).failing_runs
    }
}

/// Frame index embedded in a `frame_<i:04>.png` remote path, if any.
fn frame_index(remote: &str) -> Option<u32> {
    let name = remote.rsplit('/').next()?;
    name.strip_prefix("frame_")?.strip_suffix(".png")?.parse().ok()
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn upload(&self, _node: u32, _local: &Path, _remote: &str) -> RemoteResult<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&self, node: u32, _program: &str, _args: &[String]) -> RemoteResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(node);
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        let seen = {
            let mut runs_seen = self.runs_seen.lock().unwrap();
            let entry = runs_seen.entry(node).or_insert(0);
            *entry += 1;
            *entry
        };
        if seen <= script.failing_runs {
            return Err(RemoteError::Exec(format!("scripted failure #{seen}")));
        }
        Ok(())
    }

    async fn download(&self, node: u32, remote: &str, local: &Path) -> RemoteResult<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let script = self.script_for(node);
        let missing = |reason: &str| RemoteError::Download {
            path: remote.to_string(),
            reason: reason.to_string(),
        };

        if remote.ends_with("log.txt") {
            if script.withhold_log {
                return Err(missing("log withheld"));
            }
            write_stub(local, format!("Node({node}): mock log\n").as_bytes()).await?;
            return Ok(());
        }

        match frame_index(remote) {
            _ if !self.ran_ok(node) => Err(missing("node produced no artifacts")),
            Some(index) if script.withhold.contains(&index) => Err(missing("frame withheld")),
            Some(index) => {
                // A recognizable stub, unique per frame.
                write_stub(local, format!("png:{index}").as_bytes()).await
            }
            None => Err(missing("unknown remote path")),
        }
    }
}

async fn write_stub(local: &Path, bytes: &[u8]) -> RemoteResult<()> {
    let io_err = |e: std::io::Error| RemoteError::Download {
        path: local.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(local, bytes).await.map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_parses_remote_paths() {
        assert_eq!(frame_index("output/frame_0042.png"), Some(42));
        assert_eq!(frame_index("frame_1999.png"), Some(1999));
        assert_eq!(frame_index("output/log.txt"), None);
    }

    #[tokio::test]
    async fn scripted_run_failures_are_consumed_in_order() {
        let mock = MockExecutor::new().script(
            1,
            NodeScript {
                failing_runs: 1,
                ..NodeScript::default()
            },
        );
        assert!(mock.run(1, "work/task", &[]).await.is_err());
        assert!(mock.run(1, "work/task", &[]).await.is_ok());
        assert_eq!(mock.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn frames_require_a_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockExecutor::new();
        let dest = dir.path().join("frame_0000.png");
        assert!(mock.download(1, "output/frame_0000.png", &dest).await.is_err());
        mock.run(1, "work/task", &[]).await.unwrap();
        assert!(mock.download(1, "output/frame_0000.png", &dest).await.is_ok());
    }

    #[tokio::test]
    async fn withheld_frames_fail_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockExecutor::new().script(
            2,
            NodeScript {
                withhold: [7].into_iter().collect(),
                ..NodeScript::default()
            },
        );
        mock.run(2, "work/task", &[]).await.unwrap();
        let dest = dir.path().join("frame.png");
        assert!(mock.download(2, "output/frame_0007.png", &dest).await.is_err());
        assert!(mock.download(2, "output/frame_0008.png", &dest).await.is_ok());
    }
}
