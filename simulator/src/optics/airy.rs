//! Diffraction-limited lateral PSF from the Airy pattern.
//!
//! The in-focus intensity of a circular pupil is
//!
//! ```text
//! I(r) = [2 J₁(v) / v]²,   v = 2π NA r / λ
//! ```
//!
//! Along the optical axis the Gaussian approximation from [`GaussianPsf`]
//! is reused.
//!
//! [`GaussianPsf`]: super::psf::GaussianPsf

use std::f64::consts::PI;

use ndarray::{ArrayD, IxDyn};
use scilib::math::bessel;

use super::psf::{axis_roles, gaussian_profile, half_width, AxisRole, PsfGenerator, PsfSpec};
use crate::error::{Result, SimError};

/// Zeros of J₁, i.e. the dark rings of the Airy pattern in units of v
const J1_ZEROS: [f64; 8] = [
    3.831705970207512,
    7.015586669815619,
    10.17346813506272,
    13.32369193631422,
    16.47063005087763,
    19.61585851046824,
    22.76008438059277,
    25.90367208761838,
];

/// Position of the `ring`-th dark ring (1-based) in units of v
fn dark_ring(ring: usize) -> f64 {
    match ring {
        0 => 0.0,
        r if r <= J1_ZEROS.len() => J1_ZEROS[r - 1],
        // McMahon asymptote
        r => (r as f64 + 0.25) * PI,
    }
}

/// Normalized Airy intensity at optical coordinate `v`
pub fn airy_intensity(v: f64) -> f64 {
    if v.abs() < 1e-10 {
        return 1.0;
    }
    let j1 = bessel::j_n(1, v);
    let term = 2.0 * j1 / v;
    term * term
}

/// Airy lateral profile with a Gaussian axial profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiryPsf {
    /// Number of dark rings the kernel extends to
    pub rings: usize,
    /// Sub-samples per lateral axis averaged into each voxel
    pub oversample: usize,
    /// Axial support in sigmas
    pub axial_support_sigmas: f64,
}

impl Default for AiryPsf {
    fn default() -> Self {
        Self {
            rings: 3,
            oversample: 5,
            axial_support_sigmas: 4.0,
        }
    }
}

impl AiryPsf {
    /// Radius of the outermost included dark ring, µm
    pub fn support_radius_um(&self, spec: &PsfSpec) -> f64 {
        dark_ring(self.rings.max(1)) * spec.wavelength_um()
            / (2.0 * PI * spec.numerical_aperture)
    }
}

impl PsfGenerator for AiryPsf {
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

        let roles = axis_roles(scale.len());
        let radius = self.support_radius_um(spec);
        let v_per_um = 2.0 * PI * spec.numerical_aperture / spec.wavelength_um();
        let os = self.oversample.max(1);

        let mut shape = Vec::with_capacity(roles.len());
        let mut halves = Vec::with_capacity(roles.len());
        let mut axial_profile = Vec::new();
        let mut lateral_axes = Vec::new();

        for (axis, role) in roles.iter().enumerate() {
            let half = match role {
                AxisRole::Lateral => {
                    lateral_axes.push(axis);
                    half_width(radius, scale[axis], max_shape[axis])
                }
                AxisRole::Axial => {
                    let sigma = spec.axial_sigma_um();
                    let half = half_width(
                        self.axial_support_sigmas * sigma,
                        scale[axis],
                        max_shape[axis],
                    );
                    axial_profile = gaussian_profile(sigma, scale[axis], half, os);
                    half
                }
                AxisRole::Passive => 0,
            };
            halves.push(half);
            shape.push(2 * half + 1);
        }

        // Sub-voxel offsets shared by every lateral axis
        let offsets: Vec<f64> = (0..os).map(|s| (s as f64 + 0.5) / os as f64 - 0.5).collect();
        let lateral_shape: Vec<usize> = lateral_axes.iter().map(|&a| shape[a]).collect();
        let samples_per_voxel = os.pow(lateral_axes.len() as u32);

        let lateral = ArrayD::from_shape_fn(IxDyn(&lateral_shape), |index| {
            let mut total = 0.0;
            for sample in 0..samples_per_voxel {
                let mut r2 = 0.0;
                let mut rest = sample;
                for (k, &axis) in lateral_axes.iter().enumerate() {
                    let offset = offsets[rest % os];
                    rest /= os;
                    let x = (index[k] as f64 - halves[axis] as f64 + offset) * scale[axis];
                    r2 += x * x;
                }
                total += airy_intensity(v_per_um * r2.sqrt());
            }
            total / samples_per_voxel as f64
        });

        let kernel = ArrayD::from_shape_fn(IxDyn(&shape), |index| {
            let mut lateral_index = Vec::with_capacity(lateral_axes.len());
            let mut value = 1.0;
            for (axis, role) in roles.iter().enumerate() {
                match role {
                    AxisRole::Lateral => lateral_index.push(index[axis]),
                    AxisRole::Axial => value *= axial_profile[index[axis]],
                    AxisRole::Passive => {}
                }
            }
            value * lateral[lateral_index.as_slice()]
        });

        Ok(kernel)
    }
}
