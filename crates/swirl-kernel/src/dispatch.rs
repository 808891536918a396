//! Job dispatch — fan the fleet out, collect what comes back.
//!
//! Jobs are independent: each owns its spec, its sandbox, and its slot in
//! the shared output directory (distinct filenames guaranteed by the
//! partitioning invariant). Concurrency is bounded by a semaphore; no
//! ordering exists between nodes, and one node's failure never aborts the
//! others. Reassembly order is the aggregator's problem.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use swirl_types::{frame_file_name, FarmError, FarmResult, FrameInterval, JobSpec, NodeRef, RunResult, RunStatus};

use crate::partition::{partition, RemainderPolicy};
use crate::remote::RemoteExecutor;

/// Remote path the worker program is shipped to.
const REMOTE_PROGRAM: &str = "work/task";
/// Remote directory the worker writes into.
const REMOTE_OUTPUT: &str = "output";

/// Dispatch tuning. Defaults allow ten minutes of initialization overhead
/// plus two minutes per node.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Worker program shipped to every node.
    pub program: PathBuf,
    /// Maximum concurrently executing jobs.
    pub max_workers: usize,
    /// Whole-job re-dispatches after a non-success (rendering is
    /// idempotent, so re-running a job is always safe).
    pub retries: u32,
    pub init_overhead: Duration,
    pub per_node_allowance: Duration,
    pub remainder: RemainderPolicy,
}

impl DispatchConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            max_workers: 4,
            retries: 0,
            init_overhead: Duration::from_secs(600),
            per_node_allowance: Duration::from_secs(120),
            remainder: RemainderPolicy::default(),
        }
    }

    /// Global deadline for a fleet of `node_count` jobs.
    pub fn timeout(&self, node_count: u32) -> Duration {
        self.init_overhead + self.per_node_allowance * node_count
    }
}

/// One `JobSpec` per node index in `[1, node_count]`.
pub fn build_jobs(
    node_count: u32,
    duration: f64,
    sampling_step: f64,
    trajectory_count: usize,
    seed: u64,
    output_dir: impl Into<PathBuf>,
) -> Vec<JobSpec> {
    let output_dir = output_dir.into();
    (1..=node_count)
        .map(|index| JobSpec {
            node: NodeRef::new(index, node_count),
            duration,
            sampling_step,
            trajectory_count,
            seed,
            output_dir: output_dir.clone(),
        })
        .collect()
}

/// Typed argument vector for the worker program. The flags must match the
/// worker CLI; nothing here ever passes through a shell. The remainder
/// policy travels with the job so the worker partitions exactly like the
/// coordinator did.
pub fn worker_args(job: &JobSpec, remainder: RemainderPolicy) -> Vec<String> {
    let mut args = vec![
        "node".to_string(),
        "--node".into(),
        job.node.to_string(),
        "--duration".into(),
        job.duration.to_string(),
        "--sampling-step".into(),
        job.sampling_step.to_string(),
        "--trajectories".into(),
        job.trajectory_count.to_string(),
        "--seed".into(),
        job.seed.to_string(),
        "--output-dir".into(),
        REMOTE_OUTPUT.into(),
    ];
    if remainder == RemainderPolicy::Truncate {
        args.push("--truncate-remainder".into());
    }
    args
}

pub struct JobDispatcher {
    executor: Arc<dyn RemoteExecutor>,
    config: DispatchConfig,
}

impl JobDispatcher {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: DispatchConfig) -> Self {
        Self { executor, config }
    }

    /// Dispatch every job concurrently (bounded by `max_workers`) and wait
    /// until all reach a terminal state or the global deadline passes.
    /// Jobs still running at the deadline are aborted and reported `Fatal`;
    /// their indices surface later as aggregation gaps.
    ///
    /// Fails up front on an invalid partition — nothing is dispatched then.
    pub async fn dispatch_all(&self, jobs: Vec<JobSpec>) -> FarmResult<Vec<RunResult>> {
        // Validate every interval before any job leaves the building.
        let mut planned = Vec::with_capacity(jobs.len());
        for job in jobs {
            let interval = partition(job.node, job.duration, job.sampling_step, self.config.remainder)?;
            planned.push((job, interval));
        }

        let deadline = Instant::now() + self.config.timeout(planned.len() as u32);
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut set = JoinSet::new();

        for (job, interval) in planned.clone() {
            let semaphore = semaphore.clone();
            let executor = self.executor.clone();
            let config = self.config.clone();
            set.spawn(async move {
                // Hold the permit for the job's whole remote lifecycle.
                let _permit = semaphore.acquire_owned().await;
                dispatch_one(executor, &config, job, interval).await
            });
        }

        let mut results: Vec<RunResult> = Vec::with_capacity(planned.len());
        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok(result)) => {
                        info!(node = %result.job.node, status = %result.status, "job finished");
                        results.push(result);
                    }
                    Some(Err(join_err)) => {
                        // A panicked task loses its identity; the sweep
                        // below reports the node as fatal.
                        warn!("dispatch task failed: {join_err}");
                    }
                },
                _ = sleep_until(deadline) => {
                    warn!("global timeout reached, aborting outstanding jobs");
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    break;
                }
            }
        }

        // Nodes that never reported (aborted or panicked) contribute no
        // frames and appear as gaps.
        for (job, interval) in planned {
            if !results.iter().any(|r| r.job.node == job.node) {
                results.push(RunResult::fatal(
                    job,
                    interval,
                    "aborted before completion (global timeout)".into(),
                ));
            }
        }
        results.sort_by_key(|r| r.job.node.index);
        Ok(results)
    }
}

/// Run one job to a terminal state, re-dispatching up to `retries` times.
async fn dispatch_one(
    executor: Arc<dyn RemoteExecutor>,
    config: &DispatchConfig,
    job: JobSpec,
    interval: FrameInterval,
) -> RunResult {
    let attempts = config.retries + 1;
    let mut result = attempt(&*executor, config, &job, interval).await;
    for attempt_no in 2..=attempts {
        if result.status == RunStatus::Success {
            break;
        }
        warn!(node = %job.node, attempt = attempt_no, "re-dispatching after {}", result.status);
        result = attempt(&*executor, config, &job, interval).await;
    }
    result
}

/// One upload → run → download pass for a job.
async fn attempt(
    executor: &dyn RemoteExecutor,
    config: &DispatchConfig,
    job: &JobSpec,
    interval: FrameInterval,
) -> RunResult {
    let node = job.node;
    let mut notes = String::new();

    if let Err(err) = executor.upload(node.index, &config.program, REMOTE_PROGRAM).await {
        let reason = FarmError::RemoteExecution {
            node: node.index,
            reason: err.to_string(),
        };
        warn!(node = %node, "{reason}");
        return RunResult::fatal(job.clone(), interval, reason.to_string());
    }

    info!(node = %node, interval = %interval, "running worker");
    let args = worker_args(job, config.remainder);
    if let Err(err) = executor.run(node.index, REMOTE_PROGRAM, &args).await {
        // The node may still have produced frames before dying; attempt the
        // downloads regardless and let the retrieved set decide the status.
        let reason = FarmError::RemoteExecution {
            node: node.index,
            reason: err.to_string(),
        };
        warn!(node = %node, "{reason}");
        notes.push_str(&format!("{reason}\n"));
    }

    let mut log = String::new();
    let log_dest = job.output_dir.join("logs").join(format!("node-{}.log", node.index));
    match executor.download(node.index, &format!("{REMOTE_OUTPUT}/log.txt"), &log_dest).await {
        Ok(()) => {
            log = tokio::fs::read_to_string(&log_dest).await.unwrap_or_default();
        }
        Err(err) => {
            warn!(node = %node, "log not retrieved: {err}");
            notes.push_str(&format!("log not retrieved: {err}\n"));
        }
    }

    let mut frames_returned = BTreeSet::new();
    for index in interval.indices() {
        let name = frame_file_name(index);
        let remote = format!("{REMOTE_OUTPUT}/{name}");
        match executor.download(node.index, &remote, &job.output_dir.join(&name)).await {
            Ok(()) => {
                frames_returned.insert(index);
            }
            Err(err) => {
                warn!(node = %node, frame = index, "frame not retrieved: {err}");
            }
        }
    }

    let got = frames_returned.len();
    let want = interval.len() as usize;
    if got < want {
        let transfer = FarmError::IncompleteTransfer {
            node: node.index,
            got,
            want,
        };
        warn!(node = %node, "{transfer}");
        notes.push_str(&format!("{transfer}\n"));
    }

    log.push_str(&notes);
    RunResult::classify(job.clone(), interval, frames_returned, log)
}
