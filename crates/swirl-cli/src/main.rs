//! swirl CLI entry point.
//!
//! Usage:
//!   swirl run [OPTIONS]        # Coordinate a fleet: dispatch, aggregate, encode
//!   swirl node [OPTIONS]       # Render one node's slice (run on the worker)
//!
//! The coordinator ships its own executable to each node sandbox and invokes
//! it with the `node` subcommand, so one binary serves both roles.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swirl_kernel::ensemble::LorenzParams;
use swirl_kernel::{
    aggregate, build_jobs, encode, generate, integrate, partition, render, total_frames,
    DispatchConfig, EncoderConfig, FrameStyle, GapPolicy, JobDispatcher, LocalExecutor,
    RemainderPolicy,
};
use swirl_types::{AnimationManifest, FarmError, NodeRef, RunResult};

#[derive(Parser, Debug)]
#[command(name = "swirl", version, about = "Distributed Lorenz attractor animation farm")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Coordinate a full run: dispatch every node, aggregate, encode.
    Run(RunArgs),
    /// Render one node's frame slice (invoked on the worker).
    Node(NodeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory the retrieved frames and manifest land in.
    #[arg(long, short = 'o', default_value = "output")]
    output_dir: PathBuf,
    /// Sampling step in seconds.
    #[arg(long, short = 'l', default_value_t = 0.01)]
    sampling_step: f64,
    /// Total simulated duration in seconds.
    #[arg(long, short = 'd', default_value_t = 20)]
    duration: u32,
    /// Number of trajectories in the ensemble.
    #[arg(long, short = 'm', default_value_t = 20)]
    trajectories: usize,
    /// Number of worker nodes.
    #[arg(long, default_value_t = 4)]
    nodes: u32,
    /// Maximum concurrently running nodes (defaults to --nodes).
    #[arg(long)]
    max_workers: Option<usize>,
    /// Seed for the shared initial conditions.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Whole-job re-dispatches per node after a failure.
    #[arg(long, default_value_t = 0)]
    retries: u32,
    /// Encode whatever frames arrived instead of failing on gaps.
    #[arg(long)]
    allow_gaps: bool,
    /// Leave the trailing remainder unassigned instead of extending the
    /// last node's interval.
    #[arg(long)]
    truncate_remainder: bool,
    /// Validate and aggregate only; skip the encoder.
    #[arg(long)]
    skip_encode: bool,
    /// Final artifact path.
    #[arg(long, default_value = "output.gif")]
    artifact: PathBuf,
}

#[derive(Args, Debug)]
struct NodeArgs {
    /// This node's position, as `<index>/<count>`.
    #[arg(long, short = 'n', default_value = "1/4")]
    node: NodeRef,
    /// Directory frames and log.txt are written into.
    #[arg(long, short = 'o', default_value = "output")]
    output_dir: PathBuf,
    /// Sampling step in seconds.
    #[arg(long, short = 'l', default_value_t = 0.01)]
    sampling_step: f64,
    /// Total simulated duration in seconds.
    #[arg(long, short = 'd', default_value_t = 20)]
    duration: u32,
    /// Number of trajectories in the ensemble.
    #[arg(long, short = 'm', default_value_t = 20)]
    trajectories: usize,
    /// Seed for the shared initial conditions.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Partition with truncating arithmetic (must match the coordinator).
    #[arg(long)]
    truncate_remainder: bool,
}

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_coordinator(args),
        Command::Node(args) => run_node(args),
    }
}

fn remainder_policy(truncate: bool) -> RemainderPolicy {
    if truncate {
        RemainderPolicy::Truncate
    } else {
        RemainderPolicy::ExtendLast
    }
}

/// Coordinate the whole fleet and reassemble the animation.
fn run_coordinator(args: RunArgs) -> Result<ExitCode> {
    let duration = f64::from(args.duration);
    let total = total_frames(duration, args.sampling_step).context("invalid run parameters")?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("cannot create {}", args.output_dir.display()))?;

    let program = std::env::current_exe().context("cannot locate the worker program")?;
    let mut config = DispatchConfig::new(program);
    config.max_workers = args.max_workers.unwrap_or(args.nodes as usize).max(1);
    config.retries = args.retries;
    config.remainder = remainder_policy(args.truncate_remainder);

    let jobs = build_jobs(
        args.nodes,
        duration,
        args.sampling_step,
        args.trajectories,
        args.seed,
        &args.output_dir,
    );
    info!(nodes = args.nodes, total, "dispatching fleet");

    let executor = Arc::new(LocalExecutor::new(args.output_dir.join("nodes")));
    let dispatcher = JobDispatcher::new(executor, config);

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(dispatcher.dispatch_all(jobs))?;

    let policy = if args.allow_gaps {
        GapPolicy::EncodeAvailable
    } else {
        GapPolicy::Fail
    };
    let aggregated = aggregate(&results, total, &args.output_dir, policy);
    print!("{}", summary(&results, &aggregated));

    let manifest = match aggregated {
        Ok(manifest) => manifest,
        Err(err) => {
            eprintln!("Run failed: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if args.skip_encode {
        println!("Encoding skipped; manifest covers {} frame(s).", manifest.frames.len());
    } else if manifest.frames.is_empty() {
        println!("Nothing to encode.");
        return Ok(ExitCode::FAILURE);
    } else {
        let encoder = EncoderConfig {
            output: args.artifact,
            ..EncoderConfig::default()
        };
        let artifact = rt
            .block_on(encode(&args.output_dir, &encoder))
            .context("encoding failed")?;
        println!("Animation written to {}", artifact.display());
    }

    Ok(if manifest.complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Render this node's slice of the animation.
fn run_node(args: NodeArgs) -> Result<ExitCode> {
    let duration = f64::from(args.duration);
    let interval = partition(
        args.node,
        duration,
        args.sampling_step,
        remainder_policy(args.truncate_remainder),
    )?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("cannot create {}", args.output_dir.display()))?;

    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(args.output_dir.join("log.txt"))
        .context("cannot open log.txt")?;
    writeln!(
        log,
        "Node({}): rendering {} of {} frames, {} trajectories, step {}",
        args.node,
        interval,
        total_frames(duration, args.sampling_step)?,
        args.trajectories,
        args.sampling_step
    )?;

    // Every node integrates the full ensemble; the shared seed makes the
    // trajectory fields identical, so only the rendered slice differs.
    let set = generate(args.seed, args.trajectories);
    let series = integrate(&set, duration, args.sampling_step, &LorenzParams::default())?;
    let written = render(
        args.node,
        &series,
        interval,
        &FrameStyle::default(),
        &args.output_dir,
        &mut log,
    )?;

    info!(node = %args.node, frames = written.len(), "node finished");
    Ok(ExitCode::SUCCESS)
}

/// Human summary: every node's range and status, then what's missing, per
/// the aggregation outcome.
fn summary(results: &[RunResult], aggregated: &Result<AnimationManifest, FarmError>) -> String {
    let mut out = String::from("Run summary:\n");
    for result in results {
        out.push_str(&format!(
            "  node {:>5}  {:>14}  {:<15}  {}/{} frames\n",
            result.job.node.to_string(),
            result.interval.to_string(),
            result.status.to_string(),
            result.frames_returned.len(),
            result.interval.len(),
        ));
    }
    let missing = match aggregated {
        Ok(manifest) => manifest.missing.clone(),
        Err(FarmError::AggregationGap { missing, .. }) => missing.clone(),
        Err(_) => Vec::new(),
    };
    if missing.is_empty() {
        out.push_str("  all frames accounted for\n");
    } else {
        out.push_str(&format!(
            "  missing {} frame(s): {}\n",
            missing.len(),
            format_index_runs(&missing)
        ));
    }
    out
}

/// Compress sorted indices into `a-b` runs for display.
fn format_index_runs(indices: &[u32]) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut iter = indices.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end = iter.next().unwrap();
        }
        if start == end {
            runs.push(start.to_string());
        } else {
            runs.push(format!("{start}-{end}"));
        }
    }
    runs.join(", ")
}
