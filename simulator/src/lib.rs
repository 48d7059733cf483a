//! Fluorescence microscope image simulation
//!
//! This crate renders synthetic specimens onto a spatial grid, blurs them
//! with an optical point-spread function and turns the resulting photon flux
//! into a realistic digital camera frame, keeping physical units explicit
//! at every stage.

pub mod error;
pub mod hardware;
pub mod image;
pub mod optics;
pub mod pipeline;
pub mod samples;
pub mod shared_args;
pub mod space;
pub mod units;

// Re-exports for easier access
pub use error::{ErrorKind, Result, SimError, Stage};
pub use hardware::{models, simulate_camera, CameraFrame, CameraModel, GainModel};
pub use image::{DigitalImage, FluxImage, ImageArray};
pub use optics::{
    convolve, convolve_chunked, AiryPsf, ConvolutionMethod, ConvolveOptions, GaussianPsf,
    PsfGenerator, PsfSpec,
};
pub use pipeline::{simulate, Simulation, SimulationOutput};
pub use samples::{render, Renderable, Sample};
pub use space::{make_grid, Grid};
pub use units::{Length, LengthExt, Unit};
