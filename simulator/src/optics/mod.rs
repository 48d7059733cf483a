//! Optical blur: PSF generation and convolution.

pub mod airy;
pub mod chunked;
pub mod convolve;
pub mod fft;
pub mod psf;

pub use airy::{airy_intensity, AiryPsf};
pub use chunked::{convolve_chunked, convolve_kernel_chunked};
pub use convolve::{
    convolve, convolve_with_kernel, ConvolutionMethod, ConvolveOptions, NormalizedKernel,
};
pub use psf::{axis_roles, AxisRole, GaussianPsf, PsfGenerator, PsfSpec};
