//! Frame rendering — one PNG per global frame index.
//!
//! Each frame draws every trajectory's history up to a per-frame sample
//! count, plus the current head point, from a camera whose azimuth sweeps
//! with the same mapping that drives the history length. Rendering is pure
//! with respect to its inputs: identical series + interval + style produce
//! byte-identical files, which is what makes re-dispatching a failed node
//! safe.

use std::io::Write;
use std::path::Path;

use plotters::prelude::*;

use swirl_types::{frame_file_name, FarmError, FarmResult, FrameInterval, NodeRef};

use crate::ensemble::{history_len, TrajectorySeries};

/// Cosmetic parameters, passed through unchanged from the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStyle {
    pub width: u32,
    pub height: u32,
    /// Camera altitude in degrees.
    pub pitch_deg: f64,
    /// Degrees of azimuth per history sample.
    pub azimuth_step_deg: f64,
    /// Fixed axis bounds: (x, y, z) min/max pairs.
    pub bounds: [(f64, f64); 3],
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pitch_deg: 30.0,
            azimuth_step_deg: 0.3,
            bounds: [(-25.0, 25.0), (-35.0, 35.0), (5.0, 55.0)],
        }
    }
}

/// Render every frame in `interval`, writing `frame_<i:04>.png` files under
/// `out_dir` and one progress line per frame to `log`.
///
/// Frames are produced in increasing index order; the returned indices
/// mirror that order. The zero-padded names sort lexicographically in index
/// order, which reassembly and the encoder's input pattern rely on.
pub fn render(
    node: NodeRef,
    series: &TrajectorySeries,
    interval: FrameInterval,
    style: &FrameStyle,
    out_dir: &Path,
    log: &mut dyn Write,
) -> FarmResult<Vec<u32>> {
    let series_len = series.len();
    if (interval.end as usize) > series_len {
        return Err(FarmError::Render(format!(
            "interval {interval} exceeds series of {series_len} samples"
        )));
    }

    let mut written = Vec::with_capacity(interval.len() as usize);
    for index in interval.indices() {
        let path = out_dir.join(frame_file_name(index));
        writeln!(log, "Node({node}): generating {}", path.display())?;
        render_frame(series, index, style, &path)?;
        written.push(index);
    }
    Ok(written)
}

fn render_frame(
    series: &TrajectorySeries,
    index: u32,
    style: &FrameStyle,
    path: &Path,
) -> FarmResult<()> {
    let k = history_len(index, series.len());

    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let [(x0, x1), (y0, y1), (z0, z1)] = style.bounds;
    let mut chart = ChartBuilder::on(&root)
        .margin(0)
        .build_cartesian_3d(x0..x1, y0..y1, z0..z1)
        .map_err(draw_err)?;

    // Camera azimuth is coupled to the history length, not the raw frame
    // index — the sweep accelerates and wraps with the drawn history.
    let pitch = style.pitch_deg.to_radians();
    let yaw = (style.azimuth_step_deg * k as f64).to_radians();
    chart.with_projection(|mut pb| {
        pb.pitch = pitch;
        pb.yaw = yaw;
        pb.scale = 0.9;
        pb.into_matrix()
    });

    let count = series.samples.len();
    for (t, trajectory) in series.samples.iter().enumerate() {
        let color = trajectory_color(t, count);
        let head = &trajectory[..k];
        chart
            .draw_series(LineSeries::new(head.iter().map(|&[x, y, z]| (x, y, z)), &color))
            .map_err(draw_err)?;
        if let Some(&[x, y, z]) = head.last() {
            chart
                .draw_series(std::iter::once(Circle::new((x, y, z), 3, color.filled())))
                .map_err(draw_err)?;
        }
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Hue ramp over the ensemble, blue for the first trajectory through red
/// for the last.
fn trajectory_color(index: usize, count: usize) -> HSLColor {
    let span = count.saturating_sub(1).max(1) as f64;
    let frac = index as f64 / span;
    HSLColor(2.0 / 3.0 * (1.0 - frac), 1.0, 0.5)
}

fn draw_err<E: std::fmt::Display>(err: E) -> FarmError {
    FarmError::Render(err.to_string())
}
