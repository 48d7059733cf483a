//! End-to-end simulation: sample, optics, camera.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::error::Result;
use crate::hardware::{CameraFrame, CameraModel};
use crate::image::{DigitalImage, FluxImage};
use crate::optics::{
    convolve, convolve_chunked, ConvolveOptions, GaussianPsf, PsfGenerator, PsfSpec,
};
use crate::samples::{render, Renderable};
use crate::space::Grid;

/// Render `sample` on `grid`, blur it with a Gaussian PSF for `psf_spec`
/// and image it with `camera`.
///
/// Errors from any stage are returned unchanged.
pub fn simulate<S: Renderable + ?Sized>(
    sample: &S,
    grid: &Grid,
    psf_spec: &PsfSpec,
    camera: &CameraModel,
    exposure: Duration,
    rng_seed: u64,
) -> Result<DigitalImage> {
    Simulation::new(grid.clone(), psf_spec.clone(), camera.clone())
        .run(sample, exposure, rng_seed)
}

/// Every intermediate of one simulated frame
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// Unblurred photon flux of the sample
    pub ground_truth: FluxImage,
    /// Photon flux after the PSF
    pub optical: FluxImage,
    /// Camera readout
    pub digital: DigitalImage,
}

/// A configured microscope: grid, optics and camera.
///
/// Holds no per-run state, so one `Simulation` can image many samples.
#[derive(Clone)]
pub struct Simulation {
    grid: Grid,
    psf: PsfSpec,
    camera: CameraModel,
    generator: Arc<dyn PsfGenerator>,
    options: ConvolveOptions,
    chunk_shape: Option<Vec<usize>>,
    rows_per_chunk: Option<usize>,
}

impl Simulation {
    pub fn new(grid: Grid, psf: PsfSpec, camera: CameraModel) -> Self {
        Self {
            grid,
            psf,
            camera,
            generator: Arc::new(GaussianPsf::default()),
            options: ConvolveOptions::default(),
            chunk_shape: None,
            rows_per_chunk: None,
        }
    }

    /// Use a different PSF model
    pub fn with_generator(mut self, generator: impl PsfGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Use a PSF model shared with other simulations
    pub fn with_shared_generator(mut self, generator: Arc<dyn PsfGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_options(mut self, options: ConvolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate the convolution over chunks of this shape
    pub fn with_chunk_shape(mut self, chunk_shape: Vec<usize>) -> Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    /// Rows per parallel work item in the noise stages
    pub fn with_rows_per_chunk(mut self, rows: usize) -> Self {
        self.rows_per_chunk = Some(rows);
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn psf(&self) -> &PsfSpec {
        &self.psf
    }

    /// Ground truth and blurred photon flux for `sample`
    pub fn optical_image<S: Renderable + ?Sized>(
        &self,
        sample: &S,
    ) -> Result<(FluxImage, FluxImage)> {
        let ground_truth = render(sample, &self.grid)?;
        let optical = match &self.chunk_shape {
            Some(chunk_shape) => convolve_chunked(
                &ground_truth,
                &self.psf,
                self.generator.as_ref(),
                self.options,
                chunk_shape,
            )?,
            None => convolve(&ground_truth, &self.psf, self.generator.as_ref(), self.options)?,
        };
        Ok((ground_truth, optical))
    }

    /// Simulate one frame and return only the camera readout
    pub fn run<S: Renderable + ?Sized>(
        &self,
        sample: &S,
        exposure: Duration,
        rng_seed: u64,
    ) -> Result<DigitalImage> {
        Ok(self.run_with_ground_truth(sample, exposure, rng_seed)?.digital)
    }

    /// Simulate one frame and keep every intermediate image
    pub fn run_with_ground_truth<S: Renderable + ?Sized>(
        &self,
        sample: &S,
        exposure: Duration,
        rng_seed: u64,
    ) -> Result<SimulationOutput> {
        info!(
            "Simulating {:?} grid with {} camera, exposure {:?}",
            self.grid.shape(),
            self.camera.name,
            exposure
        );

        // Reject a bad camera before spending time on the optics
        let mut frame = CameraFrame::new(&self.camera, exposure, rng_seed)?;
        if let Some(rows) = self.rows_per_chunk {
            frame = frame.with_rows_per_chunk(rows);
        }

        let (ground_truth, optical) = self.optical_image(sample)?;
        let digital = frame.expose(&optical)?;

        info!(
            "Frame complete: {:?} pixels, max {} DN",
            digital.shape(),
            digital.max_value()
        );
        Ok(SimulationOutput {
            ground_truth,
            optical,
            digital,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::optics::AiryPsf;
    use crate::samples::{FilamentLines, PointSources};
    use crate::space::make_grid;
    use crate::units::{Length, LengthExt};

    fn small_setup() -> (Grid, PsfSpec, CameraModel) {
        let grid = make_grid(&[48, 48], &[0.125, 0.125]).unwrap();
        let psf = PsfSpec::for_grid(1.4, Length::from_nanometers(525.0), 1.515, &grid).unwrap();
        (grid, psf, CameraModel::default())
    }

    #[test]
    fn test_simulate_is_deterministic() {
        let (grid, psf, camera) = small_setup();
        let sample = FilamentLines::new(8, 2.0, 500.0, 11);
        let exposure = Duration::from_millis(200);

        let a = simulate(&sample, &grid, &psf, &camera, exposure, 1).unwrap();
        let b = simulate(&sample, &grid, &psf, &camera, exposure, 1).unwrap();
        let c = simulate(&sample, &grid, &psf, &camera, exposure, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ground_truth_and_optics_are_kept() {
        let (grid, psf, camera) = small_setup();
        let sample = PointSources::single(vec![3.0, 3.0], 1000.0);
        let output = Simulation::new(grid, psf, camera)
            .with_generator(AiryPsf::default())
            .run_with_ground_truth(&sample, Duration::from_secs(1), 3)
            .unwrap();

        assert_eq!(output.ground_truth.data()[[24, 24]], 1000.0);
        assert!(output.optical.data()[[24, 24]] < 1000.0);
        assert!(output.optical.data()[[24, 25]] > 0.0);
        assert_eq!(output.digital.shape(), &[48, 48]);
    }

    #[test]
    fn test_chunked_simulation_matches() {
        let (grid, psf, camera) = small_setup();
        let sample = FilamentLines::new(6, 3.0, 200.0, 5);
        let exposure = Duration::from_millis(100);

        let whole = Simulation::new(grid.clone(), psf.clone(), camera.clone());
        let chunked = whole
            .clone()
            .with_chunk_shape(vec![10, 17])
            .with_rows_per_chunk(5);

        let a = whole.run_with_ground_truth(&sample, exposure, 9).unwrap();
        let b = chunked.run_with_ground_truth(&sample, exposure, 9).unwrap();
        for (x, y) in a.optical.data().iter().zip(b.optical.data().iter()) {
            assert!((x - y).abs() < 1e-9);
        }
        // Rounding in the ADC can only flip on a knife edge; compare closely
        let differing = a
            .digital
            .data()
            .iter()
            .zip(b.digital.data().iter())
            .filter(|(x, y)| x != y)
            .count();
        assert!(differing <= 2, "{differing} pixels differ");
    }

    #[test]
    fn test_errors_propagate_unchanged() {
        let (grid, psf, camera) = small_setup();
        let sample = PointSources::single(vec![1.0], 1.0);
        assert!(matches!(
            simulate(&sample, &grid, &psf, &camera, Duration::from_secs(1), 0),
            Err(SimError::InvalidSample(_))
        ));

        let bad_camera = camera.with_bit_depth(0);
        let sample = PointSources::single(vec![1.0, 1.0], 1.0);
        assert!(matches!(
            simulate(&sample, &grid, &psf, &bad_camera, Duration::from_secs(1), 0),
            Err(SimError::InvalidCameraModel(_))
        ));

        let mismatched = psf.with_pixel_size(Length::from_micrometers(0.5));
        let camera = CameraModel::default();
        assert!(matches!(
            simulate(&sample, &grid, &mismatched, &camera, Duration::from_secs(1), 0),
            Err(SimError::UnitMismatch { .. })
        ));
    }
}
