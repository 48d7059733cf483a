//! Physical unit tags and typed lengths
//!
//! Array values carry an explicit [`Unit`] tag so that each pipeline stage
//! can refuse input produced by the wrong predecessor. Optical lengths use
//! the `uom` crate to keep wavelengths and pixel pitches from being mixed up.

use std::fmt;

use serde::{Deserialize, Serialize};
use uom::si::length::{micrometer, nanometer};

/// Type alias for length measurements with convenient methods
pub type Length = uom::si::f64::Length;

/// What the numbers in an image array mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Photons emitted per voxel per second
    PhotonFlux,
    /// Photons collected per voxel during one frame
    Photons,
    /// Charge per pixel, in electrons
    Electrons,
    /// Quantized ADC output
    DigitalCounts,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Unit::PhotonFlux => "photon flux",
            Unit::Photons => "photons",
            Unit::Electrons => "electrons",
            Unit::DigitalCounts => "digital counts",
        };
        write!(f, "{name}")
    }
}

/// Extension trait for length conversions commonly used in optics and sensors
pub trait LengthExt {
    /// Create length from nanometers (wavelengths)
    fn from_nanometers(nm: f64) -> Self;

    /// Get length in nanometers
    fn as_nanometers(&self) -> f64;

    /// Create length from micrometers (pixel sizes)
    fn from_micrometers(um: f64) -> Self;

    /// Get length in micrometers
    fn as_micrometers(&self) -> f64;
}

impl LengthExt for Length {
    fn from_nanometers(nm: f64) -> Self {
        Length::new::<nanometer>(nm)
    }

    fn as_nanometers(&self) -> f64 {
        self.get::<nanometer>()
    }

    fn from_micrometers(um: f64) -> Self {
        Length::new::<micrometer>(um)
    }

    fn as_micrometers(&self) -> f64 {
        self.get::<micrometer>()
    }
}
