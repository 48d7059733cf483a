//! Chunk-by-chunk convolution with halo regions.
//!
//! Each output chunk is computed from its input region grown by the kernel
//! halo (`k - 1 - c` voxels before, `c` after, clipped at the array edge, where
//! zero padding applies anyway). Chunk results are collected into an arena
//! indexed by chunk coordinate and assembled into one array. With the direct
//! method the result is exactly the whole-buffer convolution; with FFT each
//! chunk pads to its own transform size, so the two agree within
//! floating-point tolerance.

use log::debug;
use ndarray::{ArrayD, IxDyn, Slice};
use rayon::prelude::*;
use shared::algo::{ChunkLayout, ChunkRegion};

use super::convolve::{
    check_input, convolve_array, generate_checked_kernel, ConvolutionMethod, ConvolveOptions,
    NormalizedKernel,
};
use super::psf::{PsfGenerator, PsfSpec};
use crate::error::{Result, SimError, Stage};
use crate::image::FluxImage;
use crate::units::Unit;

/// Like [`convolve`](super::convolve::convolve) but evaluated over chunks of
/// at most `chunk_shape` voxels.
pub fn convolve_chunked(
    image: &FluxImage,
    spec: &PsfSpec,
    generator: &dyn PsfGenerator,
    options: ConvolveOptions,
    chunk_shape: &[usize],
) -> Result<FluxImage> {
    let layout = layout_for(image, chunk_shape)?;
    let kernel = generate_checked_kernel(image, spec, generator, options)?;
    convolve_layout(image, &kernel, options.method, &layout)
}

/// Chunked convolution with an explicit kernel
pub fn convolve_kernel_chunked(
    image: &FluxImage,
    kernel: &ArrayD<f64>,
    method: ConvolutionMethod,
    chunk_shape: &[usize],
) -> Result<FluxImage> {
    check_input(image)?;
    let layout = layout_for(image, chunk_shape)?;
    let kernel = NormalizedKernel::new(kernel, image.shape())?;
    convolve_layout(image, &kernel, method, &layout)
}

fn layout_for(image: &FluxImage, chunk_shape: &[usize]) -> Result<ChunkLayout> {
    ChunkLayout::new(image.shape(), chunk_shape).map_err(|source| SimError::InvalidChunking {
        stage: Stage::Convolution,
        source,
    })
}

fn slice_region<'a>(
    array: &'a ArrayD<f64>,
    region: &ChunkRegion,
) -> ndarray::ArrayViewD<'a, f64> {
    array.slice_each_axis(|ax| {
        let axis = ax.axis.index();
        Slice::from(region.start[axis]..region.start[axis] + region.shape[axis])
    })
}

fn convolve_layout(
    image: &FluxImage,
    kernel: &NormalizedKernel,
    method: ConvolutionMethod,
    layout: &ChunkLayout,
) -> Result<FluxImage> {
    let input = image.data();
    let shape = input.shape().to_vec();
    let (before, after) = kernel.halo();

    debug!(
        "Chunked convolution: {} chunks of {:?}, halo {:?}/{:?}",
        layout.num_chunks(),
        layout.chunk_shape(),
        before,
        after
    );

    let computed: Vec<(usize, ArrayD<f64>)> = layout
        .regions()
        .into_par_iter()
        .map(|region| {
            let expanded = region.with_halo(&before, &after, &shape);
            let block = slice_region(input, &expanded).to_owned();
            let blurred = convolve_array(&block, kernel, method);

            // Offset of the chunk inside its expanded block
            let inner = ChunkRegion {
                coord: region.coord.clone(),
                start: region
                    .start
                    .iter()
                    .zip(&expanded.start)
                    .map(|(s, e)| s - e)
                    .collect(),
                shape: region.shape.clone(),
            };
            let chunk = slice_region(&blurred, &inner).to_owned();
            (layout.linear_index(&region.coord), chunk)
        })
        .collect();

    // Arena of chunk outputs addressed by linear chunk index
    let mut arena: Vec<Option<ArrayD<f64>>> = vec![None; layout.num_chunks()];
    for (slot, chunk) in computed {
        arena[slot] = Some(chunk);
    }

    let mut output = ArrayD::zeros(IxDyn(&shape));
    for region in layout.regions() {
        let slot = layout.linear_index(&region.coord);
        if let Some(chunk) = arena[slot].take() {
            output
                .slice_each_axis_mut(|ax| {
                    let axis = ax.axis.index();
                    Slice::from(region.start[axis]..region.start[axis] + region.shape[axis])
                })
                .assign(&chunk);
        }
    }

    let result = image.with_data(output, Unit::PhotonFlux, Stage::Convolution)?;
    result.check_finite(Stage::Convolution)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageArray;
    use crate::optics::convolve::{convolve, convolve_with_kernel};
    use crate::optics::psf::GaussianPsf;
    use crate::space::make_grid;
    use approx::assert_relative_eq;
    use ndarray::Dimension;

    fn ramp(shape: &[usize]) -> ArrayD<f64> {
        ArrayD::from_shape_fn(IxDyn(shape), |idx| {
            let v: usize = idx.slice().iter().enumerate().map(|(a, i)| (a + 3) * i).sum();
            (v % 7) as f64
        })
    }

    #[test]
    fn test_chunked_matches_whole_buffer() {
        let grid = make_grid(&[5, 23, 19], &[0.2, 0.1, 0.1]).unwrap();
        let image =
            ImageArray::new(ramp(grid.shape()), grid.clone(), Unit::PhotonFlux, Stage::Sample)
                .unwrap();
        let kernel = ArrayD::from_shape_fn(IxDyn(&[3, 4, 5]), |idx| {
            1.0 + (idx[0] + 2 * idx[1] + idx[2]) as f64
        });

        for method in [ConvolutionMethod::Fft, ConvolutionMethod::Direct] {
            let whole = convolve_with_kernel(&image, &kernel, method).unwrap();
            for chunk_shape in [[2, 7, 5], [5, 4, 19], [1, 1, 1]] {
                let chunked =
                    convolve_kernel_chunked(&image, &kernel, method, &chunk_shape).unwrap();
                for (a, b) in chunked.data().iter().zip(whole.data().iter()) {
                    assert_relative_eq!(a, b, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_direct_chunks_are_exact() {
        let grid = make_grid(&[17, 12], &[0.1, 0.1]).unwrap();
        let image =
            ImageArray::new(ramp(grid.shape()), grid.clone(), Unit::PhotonFlux, Stage::Sample)
                .unwrap();
        let kernel = ArrayD::from_shape_fn(IxDyn(&[5, 3]), |idx| 0.3 + (idx[0] * idx[1]) as f64);

        let whole = convolve_with_kernel(&image, &kernel, ConvolutionMethod::Direct).unwrap();
        let chunked =
            convolve_kernel_chunked(&image, &kernel, ConvolutionMethod::Direct, &[4, 5]).unwrap();
        assert_eq!(chunked.data(), whole.data());
    }

    #[test]
    fn test_chunked_with_generator() {
        let grid = make_grid(&[40, 40], &[0.1, 0.1]).unwrap();
        let mut data = grid.zeros();
        data[[10, 10]] = 100.0;
        data[[11, 30]] = 50.0;
        let image = ImageArray::new(data, grid.clone(), Unit::PhotonFlux, Stage::Sample).unwrap();
        let spec = PsfSpec::default();
        let options = ConvolveOptions::default();

        let whole = convolve(&image, &spec, &GaussianPsf::default(), options).unwrap();
        let chunked =
            convolve_chunked(&image, &spec, &GaussianPsf::default(), options, &[16, 16]).unwrap();
        for (a, b) in chunked.data().iter().zip(whole.data().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bad_chunk_shape() {
        let grid = make_grid(&[8, 8], &[1.0, 1.0]).unwrap();
        let image = ImageArray::new(grid.zeros(), grid, Unit::PhotonFlux, Stage::Sample).unwrap();
        let kernel = ArrayD::from_elem(IxDyn(&[3, 3]), 1.0);
        let err = convolve_kernel_chunked(&image, &kernel, ConvolutionMethod::Fft, &[0, 4])
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidChunking { .. }));
    }
}
