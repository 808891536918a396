//! The trajectory ensemble — seeded initial conditions and integration.
//!
//! Every node integrates the *entire* ensemble over the full time domain and
//! only renders its assigned slice. That redundancy is deliberate: it keeps
//! the nodes stateless (no cross-node state transfer), and determinism makes
//! their trajectory fields identical, so which node computed a frame never
//! matters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use swirl_types::FarmResult;

use crate::partition::total_frames;

/// One point in phase space.
pub type State = [f64; 3];

/// The ensemble's initial conditions, in generation order.
pub type TrajectorySet = Vec<State>;

/// Sampled states per trajectory: `series[trajectory][sample]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySeries {
    pub samples: Vec<Vec<State>>,
}

impl TrajectorySeries {
    /// Samples per trajectory (identical across trajectories).
    pub fn len(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lorenz system parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LorenzParams {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl Default for LorenzParams {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
        }
    }
}

/// Time-derivative of the Lorenz system.
pub fn lorenz_deriv(p: &LorenzParams, s: &State) -> State {
    let [x, y, z] = *s;
    [p.sigma * (y - x), x * (p.rho - z) - y, x * y - p.beta * z]
}

/// Initial-condition bounds: uniform per axis over `[-15, 15)`.
const IC_LOW: f64 = -15.0;
const IC_HIGH: f64 = 15.0;

/// Deterministically generate `count` initial conditions from `seed`.
///
/// Identical `(seed, count)` must yield bit-identical output on every node —
/// the linchpin that lets isolated nodes compute the same trajectory field.
/// The seed is threaded in explicitly; there is no process-global RNG.
pub fn generate(seed: u64, count: usize) -> TrajectorySet {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            [
                rng.gen_range(IC_LOW..IC_HIGH),
                rng.gen_range(IC_LOW..IC_HIGH),
                rng.gen_range(IC_LOW..IC_HIGH),
            ]
        })
        .collect()
}

/// Integrate the full ensemble over `[0, duration]`, one sample per
/// `sampling_step`, with fixed-step RK4.
pub fn integrate(
    set: &TrajectorySet,
    duration: f64,
    sampling_step: f64,
    params: &LorenzParams,
) -> FarmResult<TrajectorySeries> {
    let steps = total_frames(duration, sampling_step)? as usize;
    let samples = set
        .iter()
        .map(|&x0| {
            let mut state = x0;
            let mut series = Vec::with_capacity(steps);
            for _ in 0..steps {
                series.push(state);
                state = rk4_step(params, &state, sampling_step);
            }
            series
        })
        .collect();
    Ok(TrajectorySeries { samples })
}

/// One fourth-order Runge-Kutta step of size `dt`.
fn rk4_step(p: &LorenzParams, s: &State, dt: f64) -> State {
    let add_scaled = |a: &State, k: &State, h: f64| -> State {
        [a[0] + h * k[0], a[1] + h * k[1], a[2] + h * k[2]]
    };

    let k1 = lorenz_deriv(p, s);
    let k2 = lorenz_deriv(p, &add_scaled(s, &k1, 0.5 * dt));
    let k3 = lorenz_deriv(p, &add_scaled(s, &k2, 0.5 * dt));
    let k4 = lorenz_deriv(p, &add_scaled(s, &k3, dt));

    [
        s[0] + (dt / 6.0) * (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]),
        s[1] + (dt / 6.0) * (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]),
        s[2] + (dt / 6.0) * (k1[2] + 2.0 * k2[2] + 2.0 * k3[2] + k4[2]),
    ]
}

/// How much trajectory history frame `index` shows:
/// `(2 * (index + 1)) mod series_len`.
///
/// Camera azimuth uses the same mapping, so the sweep accelerates and wraps
/// together with the drawn history. Both sides must use this function.
pub fn history_len(index: u32, series_len: usize) -> usize {
    if series_len == 0 {
        return 0;
    }
    (2 * (index as usize + 1)) % series_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_deterministic() {
        let a = generate(1, 20);
        let b = generate(1, 20);
        assert_eq!(a, b);
        // Bit-identical, not merely approximately equal.
        for (s, t) in a.iter().zip(&b) {
            for axis in 0..3 {
                assert_eq!(s[axis].to_bits(), t[axis].to_bits());
            }
        }
    }

    #[test]
    fn generate_respects_bounds_and_count() {
        let set = generate(7, 100);
        assert_eq!(set.len(), 100);
        for s in &set {
            for &v in s {
                assert!((IC_LOW..IC_HIGH).contains(&v));
            }
        }
    }

    #[test]
    fn different_seeds_diverge() {
        assert_ne!(generate(1, 4), generate(2, 4));
    }

    #[test]
    fn integrate_is_deterministic() {
        let set = generate(1, 3);
        let p = LorenzParams::default();
        let a = integrate(&set, 2.0, 0.01, &p).unwrap();
        let b = integrate(&set, 2.0, 0.01, &p).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 200);
        assert_eq!(a.samples.len(), 3);
    }

    #[test]
    fn integrate_starts_at_initial_conditions() {
        let set = generate(3, 2);
        let series = integrate(&set, 0.5, 0.01, &LorenzParams::default()).unwrap();
        assert_eq!(series.samples[0][0], set[0]);
        assert_eq!(series.samples[1][0], set[1]);
    }

    #[test]
    fn trajectories_stay_finite() {
        // The attractor is bounded; a blown-up integration would go NaN/inf.
        let set = generate(1, 5);
        let series = integrate(&set, 20.0, 0.01, &LorenzParams::default()).unwrap();
        for traj in &series.samples {
            for s in traj {
                assert!(s.iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn history_len_wraps_modulo_series() {
        assert_eq!(history_len(0, 2000), 2);
        assert_eq!(history_len(999, 2000), 0);
        assert_eq!(history_len(1000, 2000), 2);
        assert_eq!(history_len(0, 0), 0);
    }
}
