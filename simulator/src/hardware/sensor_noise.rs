//! Camera noise pipeline: photon flux to digital counts.
//!
//! The stages run strictly in this order, each producing a fresh image:
//!
//! 1. lateral binning (sums flux)
//! 2. photon integration over the exposure
//! 3. Poisson shot noise
//! 4. quantum efficiency (photons to electrons)
//! 5. Poisson dark current over exposure plus frame readout
//! 6. Poisson clock-induced charge
//! 7. gain, deterministic or electron-multiplying
//! 8. full-well saturation
//! 9. Gaussian read noise
//! 10. ADC: scale, offset, round and clip to the bit depth
//!
//! Every stochastic stage draws from its own family of per-pixel random
//! streams derived from the frame seed, so results are bit-identical for a
//! given seed and independent of how rayon splits the work.

use std::time::Duration;

use log::{debug, warn};
use ndarray::{ArrayD, IxDyn};
use shared::algo::ElementStreams;
use shared::image_proc::{add_gaussian_noise, add_poisson_noise, apply_em_gain, apply_poisson_noise};

use super::camera::{CameraModel, GainModel};
use crate::error::{Result, SimError, Stage};
use crate::image::{DigitalImage, FluxImage, ImageArray};
use crate::units::Unit;

/// Stochastic stages; each seeds an independent stream family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseStage {
    Shot,
    Dark,
    ClockInducedCharge,
    EmGain,
    Read,
}

impl NoiseStage {
    fn family(self) -> u64 {
        match self {
            NoiseStage::Shot => 1,
            NoiseStage::Dark => 2,
            NoiseStage::ClockInducedCharge => 3,
            NoiseStage::EmGain => 4,
            NoiseStage::Read => 5,
        }
    }

    /// Per-pixel streams for this stage under `seed`
    pub fn streams(self, seed: u64) -> ElementStreams {
        ElementStreams::new(seed, self.family())
    }
}

/// Simulate one camera frame of `image` (photon flux).
///
/// # Arguments
/// * `image` - Photon flux per voxel per second
/// * `camera` - Detector parameters
/// * `exposure` - Integration time
/// * `rng_seed` - Seed for every stochastic stage
///
/// # Returns
/// Digital counts in `[0, 2^bit_depth - 1]`, on the binned grid
pub fn simulate_camera(
    image: &FluxImage,
    camera: &CameraModel,
    exposure: Duration,
    rng_seed: u64,
) -> Result<DigitalImage> {
    CameraFrame::new(camera, exposure, rng_seed)?.expose(image)
}

/// One exposure of a camera, with every stage available separately.
#[derive(Debug, Clone)]
pub struct CameraFrame<'a> {
    camera: &'a CameraModel,
    exposure: Duration,
    seed: u64,
    rows_per_chunk: Option<usize>,
}

impl<'a> CameraFrame<'a> {
    /// Validate `camera` and set up a frame
    pub fn new(camera: &'a CameraModel, exposure: Duration, seed: u64) -> Result<Self> {
        camera.validate()?;
        Ok(Self {
            camera,
            exposure,
            seed,
            rows_per_chunk: None,
        })
    }

    /// Rows per parallel work item; never changes the result
    pub fn with_rows_per_chunk(mut self, rows: usize) -> Self {
        self.rows_per_chunk = Some(rows);
        self
    }

    pub fn camera(&self) -> &CameraModel {
        self.camera
    }

    pub fn exposure(&self) -> Duration {
        self.exposure
    }

    /// Run every stage in order
    pub fn expose(&self, image: &FluxImage) -> Result<DigitalImage> {
        debug!(
            "Simulating {} frame of {:?}, exposure {:?}, seed {}",
            self.camera.name,
            image.shape(),
            self.exposure,
            self.seed
        );

        let binned = self.bin(image)?;
        let photons = self.integrate(&binned)?;
        let photons = self.shot_noise(&photons)?;
        let electrons = self.quantum_conversion(&photons)?;
        let electrons = self.dark_current(&electrons)?;
        let electrons = self.clock_induced_charge(&electrons)?;
        let electrons = self.gain(&electrons)?;
        let electrons = self.saturate(&electrons)?;
        let electrons = self.read_noise(&electrons)?;
        self.digitize(&electrons)
    }

    /// Sum flux over `binning x binning` blocks of the lateral axes
    pub fn bin(&self, image: &FluxImage) -> Result<FluxImage> {
        image.expect_unit(Unit::PhotonFlux, Stage::Camera)?;
        check_not_empty(image)?;
        image.check_non_negative(Stage::Camera)?;

        let factor = self.camera.binning;
        if factor == 1 {
            return Ok(image.clone());
        }

        let ndim = image.grid().ndim();
        let factors: Vec<usize> = (0..ndim)
            .map(|axis| if axis + 2 >= ndim { factor } else { 1 })
            .collect();
        let grid = image.grid().downsample(&factors).map_err(|_| {
            SimError::InvalidCameraModel(format!(
                "binning {factor} exceeds the image extent {:?}",
                image.shape()
            ))
        })?;

        let mut data = ArrayD::zeros(IxDyn(grid.shape()));
        let mut target = vec![0usize; ndim];
        'voxels: for (index, &value) in image.data().indexed_iter() {
            for axis in 0..ndim {
                target[axis] = index[axis] / factors[axis];
                if target[axis] >= grid.shape()[axis] {
                    continue 'voxels;
                }
            }
            data[target.as_slice()] += value;
        }

        ImageArray::new(data, grid, Unit::PhotonFlux, Stage::Camera)
    }

    /// Expected photons per pixel: flux times exposure
    pub fn integrate(&self, image: &FluxImage) -> Result<FluxImage> {
        image.expect_unit(Unit::PhotonFlux, Stage::Camera)?;
        check_not_empty(image)?;
        image.check_non_negative(Stage::Camera)?;

        let seconds = self.exposure.as_secs_f64();
        let photons = image.with_data(
            image.data().mapv(|f| f * seconds),
            Unit::Photons,
            Stage::Camera,
        )?;
        photons.check_finite(Stage::Camera)?;
        photons.log_summary("expected photons");
        Ok(photons)
    }

    /// Poisson photon arrival statistics
    pub fn shot_noise(&self, photons: &FluxImage) -> Result<FluxImage> {
        photons.expect_unit(Unit::Photons, Stage::Camera)?;
        let streams = NoiseStage::Shot.streams(self.seed);
        let data = apply_poisson_noise(photons.data(), &streams, self.rows_per_chunk);
        let sampled = photons.with_data(data, Unit::Photons, Stage::Camera)?;
        sampled.log_summary("shot noise");
        Ok(sampled)
    }

    /// Photons to photo-electrons
    pub fn quantum_conversion(&self, photons: &FluxImage) -> Result<FluxImage> {
        photons.expect_unit(Unit::Photons, Stage::Camera)?;
        let qe = self.camera.quantum_efficiency;
        photons.with_data(photons.data().mapv(|p| p * qe), Unit::Electrons, Stage::Camera)
    }

    /// Mean dark electrons per pixel over exposure plus frame readout
    pub fn dark_electrons_mean(&self, shape: &[usize]) -> f64 {
        let lateral: usize = shape.iter().rev().take(2).product();
        let integration = self.camera.dark_integration_time(self.exposure, lateral);
        self.camera.dark_current_e_p_s * integration.as_secs_f64()
    }

    pub fn dark_current(&self, electrons: &FluxImage) -> Result<FluxImage> {
        electrons.expect_unit(Unit::Electrons, Stage::Camera)?;
        let mean = self.dark_electrons_mean(electrons.shape());
        debug!("Dark current: {mean:.4} e- mean per pixel");
        let streams = NoiseStage::Dark.streams(self.seed);
        let data = add_poisson_noise(electrons.data(), mean, &streams, self.rows_per_chunk);
        electrons.with_data(data, Unit::Electrons, Stage::Camera)
    }

    pub fn clock_induced_charge(&self, electrons: &FluxImage) -> Result<FluxImage> {
        electrons.expect_unit(Unit::Electrons, Stage::Camera)?;
        let mean = self.camera.clock_induced_charge_e;
        let streams = NoiseStage::ClockInducedCharge.streams(self.seed);
        let data = add_poisson_noise(electrons.data(), mean, &streams, self.rows_per_chunk);
        electrons.with_data(data, Unit::Electrons, Stage::Camera)
    }

    pub fn gain(&self, electrons: &FluxImage) -> Result<FluxImage> {
        electrons.expect_unit(Unit::Electrons, Stage::Camera)?;
        let gain = self.camera.gain;
        let data = match self.camera.gain_model {
            GainModel::Deterministic => electrons.data().mapv(|e| e * gain),
            GainModel::ElectronMultiplying => {
                let streams = NoiseStage::EmGain.streams(self.seed);
                apply_em_gain(electrons.data(), gain, &streams, self.rows_per_chunk)
            }
        };
        let amplified = electrons.with_data(data, Unit::Electrons, Stage::Camera)?;
        amplified.check_finite(Stage::Camera)?;
        amplified.log_summary("after gain");
        Ok(amplified)
    }

    /// Clip charge to the full well
    pub fn saturate(&self, electrons: &FluxImage) -> Result<FluxImage> {
        electrons.expect_unit(Unit::Electrons, Stage::Camera)?;
        let well = self.camera.max_well_depth_e;
        let saturated = electrons.data().iter().filter(|&&e| e >= well).count();
        if saturated > 0 {
            warn!(
                "{saturated} of {} pixels reached the {well} e- full well",
                electrons.data().len()
            );
        }
        electrons.with_data(
            electrons.data().mapv(|e| e.min(well)),
            Unit::Electrons,
            Stage::Camera,
        )
    }

    pub fn read_noise(&self, electrons: &FluxImage) -> Result<FluxImage> {
        electrons.expect_unit(Unit::Electrons, Stage::Camera)?;
        let streams = NoiseStage::Read.streams(self.seed);
        let data = add_gaussian_noise(
            electrons.data(),
            self.camera.read_noise_e,
            &streams,
            self.rows_per_chunk,
        );
        let read = electrons.with_data(data, Unit::Electrons, Stage::Camera)?;
        read.log_summary("read out");
        Ok(read)
    }

    /// Scale to DN, add the offset, round and clip to the ADC range
    pub fn digitize(&self, electrons: &FluxImage) -> Result<DigitalImage> {
        electrons.expect_unit(Unit::Electrons, Stage::Camera)?;
        electrons.check_finite(Stage::Camera)?;

        let dn_per_electron = self.camera.effective_dn_per_electron();
        let offset = f64::from(self.camera.offset);
        let max_dn = f64::from(self.camera.max_dn());

        let data = electrons
            .data()
            .mapv(|e| (e * dn_per_electron + offset).round().clamp(0.0, max_dn) as u32);
        ImageArray::new(
            data,
            electrons.grid().clone(),
            Unit::DigitalCounts,
            Stage::Camera,
        )
    }
}

fn check_not_empty(image: &FluxImage) -> Result<()> {
    if image.data().is_empty() {
        return Err(SimError::EmptyImage {
            stage: Stage::Camera,
            shape: image.shape().to_vec(),
        });
    }
    Ok(())
}
