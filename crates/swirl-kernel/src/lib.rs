//! swirl-kernel: The working core of the swirl render farm.
//!
//! This crate provides:
//!
//! - **Partition**: Maps a node position to its global frame interval
//! - **Ensemble**: Seeded initial conditions and RK4 integration of the
//!   Lorenz system
//! - **Render**: One PNG per global frame index, plotters-backed
//! - **Remote**: The executor boundary (trait, local stand-in, test mock)
//! - **Dispatch**: Bounded-concurrency fan-out and result collection
//! - **Aggregate**: Coverage validation, manifest, encoder hand-off

pub mod aggregate;
pub mod dispatch;
pub mod ensemble;
pub mod partition;
pub mod remote;
pub mod render;

pub use aggregate::{aggregate, encode, EncoderConfig, GapPolicy};
pub use dispatch::{build_jobs, worker_args, DispatchConfig, JobDispatcher};
pub use ensemble::{generate, integrate, LorenzParams, TrajectorySeries, TrajectorySet};
pub use partition::{partition, total_frames, RemainderPolicy};
pub use remote::{LocalExecutor, RemoteError, RemoteExecutor, RemoteResult};
pub use render::{render, FrameStyle};
