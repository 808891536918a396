//! Pure data types for swirl — job specs, frame intervals, run results.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that the kernel, the CLI, and any external tooling agree on
//! the wire contracts without pulling the kernel's transitive deps.

pub mod error;
pub mod interval;
pub mod job;
pub mod manifest;

// Flat re-exports for convenience
pub use error::*;
pub use interval::*;
pub use job::*;
pub use manifest::*;
