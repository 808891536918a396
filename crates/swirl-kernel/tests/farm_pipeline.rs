//! End-to-end dispatch/aggregation scenarios over the mock executor.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use swirl_kernel::remote::testing::{MockExecutor, NodeScript};
use swirl_kernel::{
    aggregate, build_jobs, encode, total_frames, DispatchConfig, EncoderConfig, GapPolicy,
    JobDispatcher,
};
use swirl_types::{FarmError, FrameInterval, RunStatus};

fn config(output_dir: &std::path::Path) -> (DispatchConfig, Vec<swirl_types::JobSpec>) {
    let jobs = build_jobs(4, 20.0, 0.01, 20, 1, output_dir);
    (DispatchConfig::new("swirl"), jobs)
}

#[tokio::test]
async fn four_nodes_full_success() {
    let dir = tempfile::tempdir().unwrap();
    let (config, jobs) = config(dir.path());
    let mock = Arc::new(MockExecutor::new());
    let dispatcher = JobDispatcher::new(mock.clone(), config);

    let results = dispatcher.dispatch_all(jobs).await.unwrap();
    assert_eq!(results.len(), 4);

    // Expected intervals for 4 nodes / 20 s / 0.01 s.
    let expected = [(0, 500), (500, 1000), (1000, 1500), (1500, 2000)];
    for (result, (start, end)) in results.iter().zip(expected) {
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.interval, FrameInterval::new(start, end));
        assert_eq!(result.frames_returned.len(), 500);
        assert!(result.log.contains("mock log"));
    }

    // One remote execution per node, every frame plus one log downloaded.
    assert_eq!(mock.runs.load(Ordering::SeqCst), 4);
    assert_eq!(mock.uploads.load(Ordering::SeqCst), 4);
    assert_eq!(mock.downloads.load(Ordering::SeqCst), 2000 + 4);

    let total = total_frames(20.0, 0.01).unwrap();
    let manifest = aggregate(&results, total, dir.path(), GapPolicy::Fail).unwrap();
    assert!(manifest.complete());
    assert_eq!(manifest.frames.len(), 2000);
    assert!(manifest.frames.windows(2).all(|w| w[0] < w[1]));

    // The downloaded artifacts actually exist where the manifest points.
    assert!(manifest.frames.iter().all(|p| p.is_file()));

    // Encoder runs once over the ordered sequence ("true" stands in for
    // ffmpeg; the invocation contract is what's under test).
    let encoder = EncoderConfig {
        program: "true".into(),
        output: dir.path().join("output.gif"),
    };
    let artifact = encode(dir.path(), &encoder).await.unwrap();
    assert_eq!(artifact, dir.path().join("output.gif"));
}

#[tokio::test]
async fn partial_node_surfaces_gap_or_degraded_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (config, jobs) = config(dir.path());
    // Node 3 loses the last 100 frames of its [1000, 1500) interval.
    let mock = Arc::new(MockExecutor::new().script(
        3,
        NodeScript {
            withhold: (1400..1500).collect(),
            ..NodeScript::default()
        },
    ));
    let dispatcher = JobDispatcher::new(mock, config);

    let results = dispatcher.dispatch_all(jobs).await.unwrap();
    assert_eq!(results[2].status, RunStatus::PartialFailure);
    assert_eq!(results[2].frames_returned.len(), 400);
    assert!(results[2].log.contains("node 3 returned 400 of 500 frames"));
    for i in [0, 1, 3] {
        assert_eq!(results[i].status, RunStatus::Success);
    }

    // Strict policy refuses to encode.
    let err = aggregate(&results, 2000, dir.path(), GapPolicy::Fail).unwrap_err();
    match err {
        FarmError::AggregationGap { missing, first } => {
            assert_eq!(missing.len(), 100);
            assert_eq!(first, 1400);
            assert!(missing.iter().all(|i| (1400..1500).contains(i)));
        }
        other => panic!("expected AggregationGap, got {other}"),
    }

    // Degraded policy encodes the 1900 available frames and records the rest.
    let manifest = aggregate(&results, 2000, dir.path(), GapPolicy::EncodeAvailable).unwrap();
    assert_eq!(manifest.frames.len(), 1900);
    assert_eq!(manifest.missing.len(), 100);
}

#[tokio::test]
async fn dead_node_is_fatal_but_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = build_jobs(2, 1.0, 0.01, 4, 1, dir.path());
    let mock = Arc::new(MockExecutor::new().script(
        2,
        NodeScript {
            failing_runs: usize::MAX,
            withhold_log: true,
            ..NodeScript::default()
        },
    ));
    let dispatcher = JobDispatcher::new(mock, DispatchConfig::new("swirl"));

    let results = dispatcher.dispatch_all(jobs).await.unwrap();
    assert_eq!(results[0].status, RunStatus::Success);
    assert_eq!(results[1].status, RunStatus::Fatal);
    assert!(results[1].frames_returned.is_empty());
    assert!(results[1].log.contains("remote execution failed on node 2"));
}

#[tokio::test]
async fn retry_redispatches_the_whole_job() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = build_jobs(1, 1.0, 0.01, 4, 1, dir.path());
    let mock = Arc::new(MockExecutor::new().script(
        1,
        NodeScript {
            failing_runs: 1,
            ..NodeScript::default()
        },
    ));
    let mut config = DispatchConfig::new("swirl");
    config.retries = 1;
    let dispatcher = JobDispatcher::new(mock.clone(), config);

    let results = dispatcher.dispatch_all(jobs).await.unwrap();
    assert_eq!(results[0].status, RunStatus::Success);
    assert_eq!(results[0].frames_returned.len(), 100);
    assert_eq!(mock.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn without_retries_a_flaky_node_stays_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = build_jobs(1, 1.0, 0.01, 4, 1, dir.path());
    let mock = Arc::new(MockExecutor::new().script(
        1,
        NodeScript {
            failing_runs: 1,
            ..NodeScript::default()
        },
    ));
    let dispatcher = JobDispatcher::new(mock.clone(), DispatchConfig::new("swirl"));

    let results = dispatcher.dispatch_all(jobs).await.unwrap();
    assert_eq!(results[0].status, RunStatus::Fatal);
    assert_eq!(mock.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn global_timeout_aborts_stragglers() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = build_jobs(2, 1.0, 0.01, 4, 1, dir.path());
    let mock = Arc::new(MockExecutor::new().script(
        2,
        NodeScript {
            delay: Some(Duration::from_secs(30)),
            ..NodeScript::default()
        },
    ));
    let mut config = DispatchConfig::new("swirl");
    config.init_overhead = Duration::from_millis(500);
    config.per_node_allowance = Duration::from_millis(1);
    let dispatcher = JobDispatcher::new(mock, config);

    let results = dispatcher.dispatch_all(jobs).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, RunStatus::Success);
    assert_eq!(results[1].status, RunStatus::Fatal);
    assert!(results[1].log.contains("aborted"));

    // The straggler's interval surfaces as a gap downstream.
    let err = aggregate(&results, 100, dir.path(), GapPolicy::Fail).unwrap_err();
    assert!(matches!(err, FarmError::AggregationGap { first: 50, .. }));
}
