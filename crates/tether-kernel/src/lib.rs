//! Composition root for the Tether peer bridge.
//!
//! The kernel owns the single peer registry, correlation bridge, tool façade
//! and tool host of a process and hands them out explicitly.

pub mod config;
pub mod error;
pub mod kernel;

pub use kernel::{KernelStatus, TetherKernel};
