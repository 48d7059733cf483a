//! Shared numeric building blocks for the microsim workspace.
//!
//! Everything here is domain-agnostic: chunk layouts over N-dimensional
//! arrays, deterministic per-element random streams, noise sampling and
//! summary statistics. The `microsim` crate layers the optics and camera
//! physics on top.

pub mod algo;
pub mod image_proc;
