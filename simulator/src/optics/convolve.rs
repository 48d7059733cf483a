//! Same-size convolution of photon-flux images with a PSF kernel.
//!
//! Edges are zero padded (no light outside the volume) and the kernel is
//! normalized to unit sum, so the total flux is conserved apart from what
//! leaks across the boundary. The kernel is centered on its brightest voxel:
//!
//! ```text
//! out[i] = Σₖ kernel[k] · image[i + c - k]     (c = argmax of kernel)
//! ```
//!
//! Two interchangeable methods compute this: an FFT product over a buffer
//! padded to `n + k - 1` per axis, and a direct spatial sum.

use log::debug;
use ndarray::{ArrayD, Dimension, IxDyn, Slice, Zip};
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{FftDirection, FftPlanner};

use super::fft::fft_nd;
use super::psf::{PsfGenerator, PsfSpec};
use crate::error::{Result, SimError, Stage};
use crate::image::FluxImage;
use crate::units::Unit;

/// Algorithm used for the convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvolutionMethod {
    /// Frequency-domain product, O(N log N)
    Fft,
    /// Spatial sum, O(N·K); exact reference for small kernels
    Direct,
}

/// Options for controlling the convolution operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvolveOptions {
    /// Allowed relative disagreement between the PSF sampling and the grid scale
    pub scale_tolerance: f64,
    pub method: ConvolutionMethod,
}

impl Default for ConvolveOptions {
    fn default() -> Self {
        Self {
            scale_tolerance: 1e-3,
            method: ConvolutionMethod::Fft,
        }
    }
}

impl ConvolveOptions {
    pub fn with_method(mut self, method: ConvolutionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_scale_tolerance(mut self, tolerance: f64) -> Self {
        self.scale_tolerance = tolerance;
        self
    }
}

/// A validated kernel scaled to unit sum, with its peak voxel
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedKernel {
    data: ArrayD<f64>,
    peak: Vec<usize>,
}

impl NormalizedKernel {
    /// Validate `kernel` against an image of shape `image_shape` and normalize it.
    ///
    /// # Errors
    /// * `ShapeMismatch` - rank differs or an extent exceeds the image
    /// * `InvalidKernel` - empty, negative, non-finite or zero-sum kernel
    pub fn new(kernel: &ArrayD<f64>, image_shape: &[usize]) -> Result<Self> {
        let stage = Stage::Convolution;
        if kernel.ndim() != image_shape.len()
            || kernel.shape().iter().zip(image_shape).any(|(k, n)| k > n)
        {
            return Err(SimError::ShapeMismatch {
                stage,
                expected: image_shape.to_vec(),
                found: kernel.shape().to_vec(),
            });
        }
        if kernel.is_empty() {
            return Err(SimError::InvalidKernel {
                stage,
                reason: format!("kernel has zero extent {:?}", kernel.shape()),
            });
        }

        let mut sum = 0.0;
        let mut peak_value = f64::NEG_INFINITY;
        for (index, &value) in kernel.indexed_iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidKernel {
                    stage,
                    reason: format!("value {value} at {:?}", index.slice()),
                });
            }
            peak_value = peak_value.max(value);
            sum += value;
        }
        if sum <= 0.0 {
            return Err(SimError::InvalidKernel {
                stage,
                reason: "kernel sums to zero".to_string(),
            });
        }

        // Among equal maxima take the one nearest the geometric center
        let shape = kernel.shape();
        let mut peak = vec![0; kernel.ndim()];
        let mut best = usize::MAX;
        for (index, &value) in kernel.indexed_iter() {
            if value != peak_value {
                continue;
            }
            let offset: usize = (0..shape.len())
                .map(|axis| (2 * index[axis]).abs_diff(shape[axis] - 1).pow(2))
                .sum();
            if offset < best {
                best = offset;
                peak = index.slice().to_vec();
            }
        }

        Ok(Self {
            data: kernel.mapv(|v| v / sum),
            peak,
        })
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Index of the brightest voxel, the kernel's origin
    pub fn peak(&self) -> &[usize] {
        &self.peak
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Voxels of input needed before (`k - 1 - c`) and after (`c`) each
    /// output voxel along every axis
    pub fn halo(&self) -> (Vec<usize>, Vec<usize>) {
        let before = self
            .shape()
            .iter()
            .zip(&self.peak)
            .map(|(k, c)| k - 1 - c)
            .collect();
        (before, self.peak.clone())
    }
}

/// Blur a photon-flux image with the PSF described by `spec`.
///
/// The generator receives the image grid's own scale, and the `PsfSpec`'s
/// declared sampling must agree with it within `options.scale_tolerance`.
pub fn convolve(
    image: &FluxImage,
    spec: &PsfSpec,
    generator: &dyn PsfGenerator,
    options: ConvolveOptions,
) -> Result<FluxImage> {
    let kernel = generate_checked_kernel(image, spec, generator, options)?;
    convolve_normalized(image, &kernel, options.method)
}

/// Blur a photon-flux image with an explicit kernel
pub fn convolve_with_kernel(
    image: &FluxImage,
    kernel: &ArrayD<f64>,
    method: ConvolutionMethod,
) -> Result<FluxImage> {
    check_input(image)?;
    let kernel = NormalizedKernel::new(kernel, image.shape())?;
    convolve_normalized(image, &kernel, method)
}

/// Validate the image and spec, then ask the generator for a kernel
pub(crate) fn generate_checked_kernel(
    image: &FluxImage,
    spec: &PsfSpec,
    generator: &dyn PsfGenerator,
    options: ConvolveOptions,
) -> Result<NormalizedKernel> {
    check_input(image)?;
    spec.validate()?;
    let scale = image.grid().scale();
    spec.check_sampling(scale, options.scale_tolerance, Stage::Convolution)?;

    let kernel = generator.generate_kernel(spec, scale, image.shape())?;
    debug!("PSF kernel {:?} for image {:?}", kernel.shape(), image.shape());
    NormalizedKernel::new(&kernel, image.shape())
}

pub(crate) fn check_input(image: &FluxImage) -> Result<()> {
    image.expect_unit(Unit::PhotonFlux, Stage::Convolution)?;
    image.check_non_negative(Stage::Convolution)
}

fn convolve_normalized(
    image: &FluxImage,
    kernel: &NormalizedKernel,
    method: ConvolutionMethod,
) -> Result<FluxImage> {
    let data = convolve_array(image.data(), kernel, method);
    let result = image.with_data(data, Unit::PhotonFlux, Stage::Convolution)?;
    result.check_finite(Stage::Convolution)?;
    result.log_summary("convolved");
    Ok(result)
}

/// Same-size convolution of a raw array; no validation
pub(crate) fn convolve_array(
    input: &ArrayD<f64>,
    kernel: &NormalizedKernel,
    method: ConvolutionMethod,
) -> ArrayD<f64> {
    match method {
        ConvolutionMethod::Fft => fft_convolve(input, kernel),
        ConvolutionMethod::Direct => direct_convolve(input, kernel),
    }
}

fn fft_convolve(input: &ArrayD<f64>, kernel: &NormalizedKernel) -> ArrayD<f64> {
    let padded: Vec<usize> = input
        .shape()
        .iter()
        .zip(kernel.shape())
        .map(|(n, k)| n + k - 1)
        .collect();

    let zero = Complex64::new(0.0, 0.0);
    let mut image_spectrum = ArrayD::from_elem(IxDyn(&padded), zero);
    let mut kernel_spectrum = ArrayD::from_elem(IxDyn(&padded), zero);

    image_spectrum
        .slice_each_axis_mut(|ax| Slice::from(0..input.len_of(ax.axis)))
        .zip_mut_with(input, |dst, &src| *dst = Complex64::new(src, 0.0));
    kernel_spectrum
        .slice_each_axis_mut(|ax| Slice::from(0..kernel.data().len_of(ax.axis)))
        .zip_mut_with(kernel.data(), |dst, &src| *dst = Complex64::new(src, 0.0));

    let mut planner = FftPlanner::new();
    fft_nd(&mut image_spectrum, FftDirection::Forward, &mut planner);
    fft_nd(&mut kernel_spectrum, FftDirection::Forward, &mut planner);

    Zip::from(&mut image_spectrum)
        .and(&kernel_spectrum)
        .par_for_each(|a, &b| *a *= b);
    fft_nd(&mut image_spectrum, FftDirection::Inverse, &mut planner);

    let peak = kernel.peak();
    // Round-off can leave tiny negatives where the true result is zero
    image_spectrum
        .slice_each_axis(|ax| {
            let axis = ax.axis.index();
            Slice::from(peak[axis]..peak[axis] + input.shape()[axis])
        })
        .mapv(|z| z.re.max(0.0))
}

fn direct_convolve(input: &ArrayD<f64>, kernel: &NormalizedKernel) -> ArrayD<f64> {
    let shape = input.shape().to_vec();
    let peak = kernel.peak().to_vec();
    let taps: Vec<(Vec<usize>, f64)> = kernel
        .data()
        .indexed_iter()
        .filter(|&(_, &w)| w > 0.0)
        .map(|(k, &w)| (k.slice().to_vec(), w))
        .collect();

    let sum_at = |index: &[usize], source: &mut [usize]| -> f64 {
        let mut sum = 0.0;
        'taps: for (k, w) in &taps {
            for axis in 0..shape.len() {
                let s = (index[axis] + peak[axis]) as isize - k[axis] as isize;
                if s < 0 || s as usize >= shape[axis] {
                    continue 'taps;
                }
                source[axis] = s as usize;
            }
            sum += w * input[&*source];
        }
        sum
    };

    let mut output = ArrayD::zeros(IxDyn(&shape));
    let filled = output
        .as_slice_mut()
        .map(|values| {
            values.par_iter_mut().enumerate().for_each_init(
                || (vec![0usize; shape.len()], vec![0usize; shape.len()]),
                |(index, source), (linear, out)| {
                    // Row-major unravel of the linear position
                    let mut rem = linear;
                    for axis in (0..shape.len()).rev() {
                        index[axis] = rem % shape[axis];
                        rem /= shape[axis];
                    }
                    *out = sum_at(index.as_slice(), source.as_mut_slice());
                },
            )
        })
        .is_some();

    if !filled {
        let mut source = vec![0usize; shape.len()];
        for (index, out) in output.indexed_iter_mut() {
            *out = sum_at(index.slice(), source.as_mut_slice());
        }
    }
    output
}
