//! Aggregation — re-establish global order, then hand off to the encoder.
//!
//! The aggregator is the single point where ordering is reconstructed. It
//! must not run until every dispatched job reached a terminal state; the
//! dispatcher guarantees that. Overlapping indices are an invariant
//! violation and fail immediately; gaps are policy.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{info, warn};

use swirl_types::{frame_file_name, AnimationManifest, FarmError, FarmResult, RunResult};

/// What to do when the union of retrieved indices has holes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Refuse to produce an artifact.
    #[default]
    Fail,
    /// Encode what arrived and record the gaps in the manifest. The `%04d`
    /// input pattern means the encoder consumes the contiguous prefix; the
    /// warning names the first hole.
    EncodeAvailable,
}

/// Validate coverage of `[0, total_frames)` and build the ordered manifest.
///
/// Duplicate indices across results fail fast with `OverlappingFrames` —
/// never silently overwritten. Missing indices are handled per `policy`.
/// On success the manifest is also written to `manifest.json` under
/// `output_dir`.
pub fn aggregate(
    results: &[RunResult],
    total_frames: u32,
    output_dir: &Path,
    policy: GapPolicy,
) -> FarmResult<AnimationManifest> {
    let mut seen = BTreeSet::new();
    for result in results {
        for &index in &result.frames_returned {
            if index >= total_frames {
                return Err(FarmError::InvalidPartition(format!(
                    "frame {index} outside [0, {total_frames})"
                )));
            }
            if !seen.insert(index) {
                return Err(FarmError::OverlappingFrames { index });
            }
        }
    }

    let missing: Vec<u32> = (0..total_frames).filter(|i| !seen.contains(i)).collect();
    if !missing.is_empty() {
        match policy {
            GapPolicy::Fail => return Err(FarmError::gap(missing)),
            GapPolicy::EncodeAvailable => {
                warn!(
                    missing = missing.len(),
                    first = missing[0],
                    "encoding a degraded artifact despite gaps"
                );
            }
        }
    }

    let frames: Vec<PathBuf> = seen.iter().map(|&i| output_dir.join(frame_file_name(i))).collect();
    let manifest = AnimationManifest {
        total_frames,
        frames,
        missing,
    };

    let manifest_path = output_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| FarmError::Io(e.to_string()))?;
    std::fs::write(&manifest_path, json)?;
    info!(frames = manifest.frames.len(), "manifest written to {}", manifest_path.display());

    Ok(manifest)
}

/// External encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Encoder binary, resolved via `PATH`.
    pub program: String,
    /// Final artifact path.
    pub output: PathBuf,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            output: PathBuf::from("output.gif"),
        }
    }
}

/// Feed the ordered frame sequence to the encoder, one external-process
/// call on the fixed `frame_%04d.png` input contract. Non-zero exit is
/// surfaced as `Encoding`; there is no automatic retry.
pub async fn encode(frames_dir: &Path, config: &EncoderConfig) -> FarmResult<PathBuf> {
    let pattern = frames_dir.join("frame_%04d.png");
    info!("encoding {} -> {}", pattern.display(), config.output.display());

    let status = Command::new(&config.program)
        .arg("-y")
        .arg("-i")
        .arg(&pattern)
        .arg(&config.output)
        .status()
        .await?;

    if !status.success() {
        return Err(FarmError::Encoding {
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(config.output.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeSet;

    use swirl_types::{FrameInterval, JobSpec, NodeRef};

    fn result(index: u32, count: u32, interval: FrameInterval, frames: BTreeSet<u32>) -> RunResult {
        let job = JobSpec {
            node: NodeRef::new(index, count),
            duration: 1.0,
            sampling_step: 0.1,
            trajectory_count: 1,
            seed: 1,
            output_dir: PathBuf::from("output"),
        };
        RunResult::classify(job, interval, frames, String::new())
    }

    #[test]
    fn full_coverage_builds_ordered_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            result(1, 2, FrameInterval::new(0, 5), (0..5).collect()),
            result(2, 2, FrameInterval::new(5, 10), (5..10).collect()),
        ];
        let manifest = aggregate(&results, 10, dir.path(), GapPolicy::Fail).unwrap();
        assert!(manifest.complete());
        assert_eq!(manifest.frames.len(), 10);
        assert_eq!(manifest.frames[0], dir.path().join("frame_0000.png"));
        assert_eq!(manifest.frames[9], dir.path().join("frame_0009.png"));
        assert!(dir.path().join("manifest.json").is_file());
    }

    #[test]
    fn overlap_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            result(1, 2, FrameInterval::new(0, 5), (0..5).collect()),
            result(2, 2, FrameInterval::new(4, 10), (4..10).collect()),
        ];
        let err = aggregate(&results, 10, dir.path(), GapPolicy::EncodeAvailable).unwrap_err();
        assert!(matches!(err, FarmError::OverlappingFrames { index: 4 }));
    }

    #[test]
    fn gap_is_reported_with_indices() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            result(1, 2, FrameInterval::new(0, 5), (0..5).collect()),
            result(2, 2, FrameInterval::new(5, 10), [5, 6, 8, 9].into_iter().collect()),
        ];
        let err = aggregate(&results, 10, dir.path(), GapPolicy::Fail).unwrap_err();
        match err {
            FarmError::AggregationGap { missing, first } => {
                assert_eq!(missing, vec![7]);
                assert_eq!(first, 7);
            }
            other => panic!("expected AggregationGap, got {other}"),
        }
    }

    #[test]
    fn gap_policy_can_degrade_instead() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            result(1, 2, FrameInterval::new(0, 5), (0..5).collect()),
            result(2, 2, FrameInterval::new(5, 10), [5, 6, 8, 9].into_iter().collect()),
        ];
        let manifest = aggregate(&results, 10, dir.path(), GapPolicy::EncodeAvailable).unwrap();
        assert!(!manifest.complete());
        assert_eq!(manifest.missing, vec![7]);
        assert_eq!(manifest.frames.len(), 9);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![result(1, 1, FrameInterval::new(0, 5), (0..6).collect())];
        let err = aggregate(&results, 5, dir.path(), GapPolicy::Fail).unwrap_err();
        assert!(matches!(err, FarmError::InvalidPartition(_)));
    }

    #[tokio::test]
    async fn encoder_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncoderConfig {
            program: "false".into(),
            output: dir.path().join("out.gif"),
        };
        let err = encode(dir.path(), &config).await.unwrap_err();
        assert!(matches!(err, FarmError::Encoding { .. }));
    }

    #[tokio::test]
    async fn missing_encoder_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncoderConfig {
            program: "definitely-not-an-encoder".into(),
            output: dir.path().join("out.gif"),
        };
        let err = encode(dir.path(), &config).await.unwrap_err();
        assert!(matches!(err, FarmError::Io(_)));
    }
}
