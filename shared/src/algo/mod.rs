//! Array-level algorithms shared across the workspace.

pub mod chunks;
pub mod parallel;
pub mod stats;

pub use chunks::{ChunkError, ChunkLayout, ChunkRegion};
pub use parallel::{sample_per_element, ElementStreams};
pub use stats::{StatsError, StatsScan};
