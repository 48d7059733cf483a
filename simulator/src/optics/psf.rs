//! Optical parameters and the PSF generator interface.
//!
//! A [`PsfSpec`] describes the objective and sampling; a [`PsfGenerator`]
//! turns it into a kernel array sampled at the image grid's scale. Axes are
//! assigned roles from the back: the last two axes are lateral (y, x), the
//! axis before them is axial (z), and any further leading axes (time,
//! channel) are not blurred.

use ndarray::{ArrayD, IxDyn};

use crate::error::{Result, SimError, Stage};
use crate::space::Grid;
use crate::units::{Length, LengthExt};

/// How a kernel axis is treated by the optics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRole {
    Lateral,
    Axial,
    /// Not blurred; the kernel has extent 1 here
    Passive,
}

/// Role of every axis of an `ndim`-dimensional array
pub fn axis_roles(ndim: usize) -> Vec<AxisRole> {
    (0..ndim)
        .map(|axis| {
            let from_back = ndim - axis;
            match from_back {
                1 | 2 => AxisRole::Lateral,
                3 => AxisRole::Axial,
                _ => AxisRole::Passive,
            }
        })
        .collect()
}

/// Optical parameters that fully determine a PSF kernel
#[derive(Debug, Clone, PartialEq)]
pub struct PsfSpec {
    pub numerical_aperture: f64,
    /// Emission wavelength
    pub wavelength: Length,
    /// Refractive index of the immersion medium
    pub refractive_index: f64,
    /// Lateral sampling of the kernel
    pub pixel_size: Length,
    /// Axial sampling of the kernel
    pub z_spacing: Length,
}

impl Default for PsfSpec {
    fn default() -> Self {
        Self {
            numerical_aperture: 1.4,
            wavelength: Length::from_nanometers(525.0),
            refractive_index: 1.515,
            pixel_size: Length::from_micrometers(0.1),
            z_spacing: Length::from_micrometers(0.2),
        }
    }
}

impl PsfSpec {
    /// Create and validate a spec
    pub fn new(
        numerical_aperture: f64,
        wavelength: Length,
        refractive_index: f64,
        pixel_size: Length,
        z_spacing: Length,
    ) -> Result<Self> {
        let spec = Self {
            numerical_aperture,
            wavelength,
            refractive_index,
            pixel_size,
            z_spacing,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Spec whose sampling matches `grid` (lateral from the last axis,
    /// axial from the third-to-last, or the lateral scale for 2-D grids)
    pub fn for_grid(
        numerical_aperture: f64,
        wavelength: Length,
        refractive_index: f64,
        grid: &Grid,
    ) -> Result<Self> {
        let scale = grid.scale();
        let lateral = scale[scale.len() - 1];
        let axial = if scale.len() >= 3 {
            scale[scale.len() - 3]
        } else {
            lateral
        };
        Self::new(
            numerical_aperture,
            wavelength,
            refractive_index,
            Length::from_micrometers(lateral),
            Length::from_micrometers(axial),
        )
    }

    pub fn with_pixel_size(mut self, pixel_size: Length) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    pub fn with_z_spacing(mut self, z_spacing: Length) -> Self {
        self.z_spacing = z_spacing;
        self
    }

    /// Check the physical constraints on the parameters
    pub fn validate(&self) -> Result<()> {
        let na = self.numerical_aperture;
        if !(na.is_finite() && na > 0.0) {
            return Err(SimError::InvalidPsfSpec(format!(
                "numerical aperture must be positive, got {na}"
            )));
        }
        if !(self.refractive_index.is_finite() && self.refractive_index >= na) {
            return Err(SimError::InvalidPsfSpec(format!(
                "refractive index {} is below the numerical aperture {na}",
                self.refractive_index
            )));
        }
        for (name, length) in [
            ("wavelength", self.wavelength),
            ("pixel size", self.pixel_size),
            ("z spacing", self.z_spacing),
        ] {
            let um = length.as_micrometers();
            if !(um.is_finite() && um > 0.0) {
                return Err(SimError::InvalidPsfSpec(format!(
                    "{name} must be positive, got {um} µm"
                )));
            }
        }
        Ok(())
    }

    /// Wavelength in µm
    pub fn wavelength_um(&self) -> f64 {
        self.wavelength.as_micrometers()
    }

    /// Lateral Gaussian sigma in µm (0.21 λ / NA)
    pub fn lateral_sigma_um(&self) -> f64 {
        0.21 * self.wavelength_um() / self.numerical_aperture
    }

    /// Axial Gaussian sigma in µm (0.66 n λ / NA²)
    pub fn axial_sigma_um(&self) -> f64 {
        0.66 * self.refractive_index * self.wavelength_um()
            / (self.numerical_aperture * self.numerical_aperture)
    }

    /// Sampling this PSF declares for each axis, `None` for passive axes
    pub fn sampling_um(&self, ndim: usize) -> Vec<Option<f64>> {
        axis_roles(ndim)
            .into_iter()
            .map(|role| match role {
                AxisRole::Lateral => Some(self.pixel_size.as_micrometers()),
                AxisRole::Axial => Some(self.z_spacing.as_micrometers()),
                AxisRole::Passive => None,
            })
            .collect()
    }

    /// Fail with `UnitMismatch` when the declared sampling disagrees with
    /// `scale` by more than `tolerance` (relative)
    pub fn check_sampling(&self, scale: &[f64], tolerance: f64, stage: Stage) -> Result<()> {
        for (axis, (declared, &grid_um)) in
            self.sampling_um(scale.len()).into_iter().zip(scale).enumerate()
        {
            let Some(psf_um) = declared else {
                continue;
            };
            if (psf_um - grid_um).abs() > tolerance * grid_um {
                return Err(SimError::UnitMismatch {
                    stage,
                    axis,
                    psf_um,
                    grid_um,
                });
            }
        }
        Ok(())
    }
}

/// Produces a non-negative kernel for a PSF spec.
///
/// `scale` is the physical voxel size of the image being blurred, one entry
/// per axis, and `max_shape` its extents; the kernel must have the same rank
/// and should not exceed `max_shape` on any axis. The kernel need not be
/// normalized.
pub trait PsfGenerator: Send + Sync {
    fn generate_kernel(
        &self,
        spec: &PsfSpec,
        scale: &[f64],
        max_shape: &[usize],
    ) -> Result<ArrayD<f64>>;
}

/// Half width in voxels covering `radius_um`, capped so `2h + 1 <= max_extent`
pub(crate) fn half_width(radius_um: f64, scale_um: f64, max_extent: usize) -> usize {
    let wanted = (radius_um / scale_um).ceil().max(0.0) as usize;
    wanted.min(max_extent.saturating_sub(1) / 2)
}

/// Voxel-averaged 1-D Gaussian profile centered on index `half`
pub(crate) fn gaussian_profile(sigma_um: f64, scale_um: f64, half: usize, oversample: usize) -> Vec<f64> {
    let n = oversample.max(1);
    (0..2 * half + 1)
        .map(|i| {
            let center = i as f64 - half as f64;
            (0..n)
                .map(|s| {
                    let x = (center + (s as f64 + 0.5) / n as f64 - 0.5) * scale_um;
                    (-x * x / (2.0 * sigma_um * sigma_um)).exp()
                })
                .sum::<f64>()
                / n as f64
        })
        .collect()
}

/// Widefield PSF approximated by a separable Gaussian.
///
/// Lateral sigma 0.21 λ/NA, axial sigma 0.66 nλ/NA². Each voxel holds the
/// profile averaged over `oversample` sub-samples per axis so PSFs narrower
/// than a voxel are still integrated sensibly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPsf {
    /// Kernel support in sigmas on each side of the peak
    pub support_sigmas: f64,
    pub oversample: usize,
}

impl Default for GaussianPsf {
    fn default() -> Self {
        Self {
            support_sigmas: 4.0,
            oversample: 5,
        }
    }
}

impl PsfGenerator for GaussianPsf {
    fn generate_kernel(
        &self,
        spec: &PsfSpec,
        scale: &[f64],
        max_shape: &[usize],
    ) -> Result<ArrayD<f64>> {
        spec.validate()?;
        if scale.len() != max_shape.len() {
            return Err(SimError::InvalidPsfSpec(format!(
                "{} scales for a {}-D image",
                scale.len(),
                max_shape.len()
            )));
        }

        let profiles: Vec<Vec<f64>> = axis_roles(scale.len())
            .into_iter()
            .enumerate()
            .map(|(axis, role)| {
                let sigma = match role {
                    AxisRole::Lateral => spec.lateral_sigma_um(),
                    AxisRole::Axial => spec.axial_sigma_um(),
                    AxisRole::Passive => return vec![1.0],
                };
                let half = half_width(self.support_sigmas * sigma, scale[axis], max_shape[axis]);
                gaussian_profile(sigma, scale[axis], half, self.oversample)
            })
            .collect();

        Ok(separable_kernel(&profiles))
    }
}

/// Outer product of per-axis profiles
pub(crate) fn separable_kernel(profiles: &[Vec<f64>]) -> ArrayD<f64> {
    let shape: Vec<usize> = profiles.iter().map(Vec::len).collect();
    ArrayD::from_shape_fn(IxDyn(&shape), |index| {
        profiles
            .iter()
            .enumerate()
            .map(|(axis, profile)| profile[index[axis]])
            .product()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::make_grid;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_roles() {
        assert_eq!(axis_roles(2), vec![AxisRole::Lateral, AxisRole::Lateral]);
        assert_eq!(
            axis_roles(4),
            vec![
                AxisRole::Passive,
                AxisRole::Axial,
                AxisRole::Lateral,
                AxisRole::Lateral
            ]
        );
    }

    #[test]
    fn test_validation() {
        assert!(PsfSpec::default().validate().is_ok());

        let bad_na = PsfSpec {
            numerical_aperture: 0.0,
            ..PsfSpec::default()
        };
        assert!(matches!(bad_na.validate(), Err(SimError::InvalidPsfSpec(_))));

        let bad_index = PsfSpec {
            refractive_index: 1.0,
            ..PsfSpec::default()
        };
        assert!(bad_index.validate().is_err());

        let bad_pixel = PsfSpec::default().with_pixel_size(Length::from_micrometers(-0.1));
        assert!(bad_pixel.validate().is_err());
    }

    #[test]
    fn test_sigmas() {
        let spec = PsfSpec::default();
        assert_relative_eq!(spec.lateral_sigma_um(), 0.21 * 0.525 / 1.4, epsilon = 1e-12);
        assert_relative_eq!(
            spec.axial_sigma_um(),
            0.66 * 1.515 * 0.525 / 1.96,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_sampling_check() {
        let grid = make_grid(&[8, 16, 16], &[0.2, 0.1, 0.1]).unwrap();
        let spec = PsfSpec::for_grid(1.2, Length::from_nanometers(600.0), 1.33, &grid).unwrap();
        assert!(spec.check_sampling(grid.scale(), 1e-3, Stage::Convolution).is_ok());

        let coarse = make_grid(&[8, 16, 16], &[0.2, 0.1, 0.2]).unwrap();
        match spec.check_sampling(coarse.scale(), 1e-3, Stage::Convolution) {
            Err(SimError::UnitMismatch { axis, .. }) => assert_eq!(axis, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gaussian_kernel_shape_and_symmetry() {
        let spec = PsfSpec::default();
        let kernel = GaussianPsf::default()
            .generate_kernel(&spec, &[0.2, 0.1, 0.1], &[64, 64, 64])
            .unwrap();

        // lateral: ceil(4 * 0.07875 / 0.1) = 4, axial: ceil(4 * 0.2678 / 0.2) = 6
        assert_eq!(kernel.shape(), &[13, 9, 9]);
        let peak = kernel.iter().cloned().fold(0.0, f64::max);
        assert_eq!(kernel[[6, 4, 4]], peak);
        assert_relative_eq!(kernel[[6, 4, 1]], kernel[[6, 4, 7]], epsilon = 1e-12);
        assert_relative_eq!(kernel[[2, 4, 4]], kernel[[10, 4, 4]], epsilon = 1e-12);
        assert!(kernel.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_kernel_capped_to_image() {
        let spec = PsfSpec::default();
        let kernel = GaussianPsf::default()
            .generate_kernel(&spec, &[0.1, 0.1], &[4, 1])
            .unwrap();
        assert_eq!(kernel.shape(), &[3, 1]);
    }

    #[test]
    fn test_passive_axes_unblurred() {
        let spec = PsfSpec::default();
        let kernel = GaussianPsf::default()
            .generate_kernel(&spec, &[1.0, 0.2, 0.1, 0.1], &[3, 32, 32, 32])
            .unwrap();
        assert_eq!(kernel.shape()[0], 1);
    }
}
