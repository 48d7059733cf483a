//! Unit-tagged arrays tied to a grid.

use log::debug;
use ndarray::{ArrayD, Dimension};
use shared::algo::StatsScan;

use crate::error::{Result, SimError, Stage};
use crate::space::Grid;
use crate::units::Unit;

/// An N-dimensional array over a [`Grid`] carrying a physical unit tag.
///
/// The array shape always equals the grid shape. Stages never mutate an
/// `ImageArray` they receive; they build a new one with the unit their output
/// represents.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray<T> {
    data: ArrayD<T>,
    grid: Grid,
    unit: Unit,
}

/// Floating point image (photon flux, photons or electrons)
pub type FluxImage = ImageArray<f64>;

/// Quantized camera output
pub type DigitalImage = ImageArray<u32>;

impl<T> ImageArray<T> {
    /// Wrap `data` as an image over `grid`
    ///
    /// # Errors
    /// `ShapeMismatch` if the array shape differs from the grid shape.
    pub fn new(data: ArrayD<T>, grid: Grid, unit: Unit, stage: Stage) -> Result<Self> {
        if data.shape() != grid.shape() {
            return Err(SimError::ShapeMismatch {
                stage,
                expected: grid.shape().to_vec(),
                found: data.shape().to_vec(),
            });
        }
        Ok(Self { data, grid, unit })
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Fail with `WrongUnit` unless this image is tagged `expected`
    pub fn expect_unit(&self, expected: Unit, stage: Stage) -> Result<()> {
        if self.unit != expected {
            return Err(SimError::WrongUnit {
                stage,
                expected,
                found: self.unit,
            });
        }
        Ok(())
    }
}

impl ImageArray<f64> {
    /// Sum of all values
    pub fn total(&self) -> f64 {
        self.data.sum()
    }

    /// Fail on the first NaN or infinity
    pub fn check_finite(&self, stage: Stage) -> Result<()> {
        for (index, &value) in self.data.indexed_iter() {
            if !value.is_finite() {
                return Err(SimError::NonFinite {
                    stage,
                    index: index.slice().to_vec(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Fail on the first NaN, infinity or negative value
    pub fn check_non_negative(&self, stage: Stage) -> Result<()> {
        for (index, &value) in self.data.indexed_iter() {
            if !value.is_finite() {
                return Err(SimError::NonFinite {
                    stage,
                    index: index.slice().to_vec(),
                    value,
                });
            }
            if value < 0.0 {
                return Err(SimError::NegativeFlux {
                    stage,
                    index: index.slice().to_vec(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Same grid, new values and unit
    pub(crate) fn with_data(&self, data: ArrayD<f64>, unit: Unit, stage: Stage) -> Result<Self> {
        ImageArray::new(data, self.grid.clone(), unit, stage)
    }

    /// Log min/max/mean of the image at debug level
    pub(crate) fn log_summary(&self, label: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let scan = StatsScan::from_values(self.data.iter().copied());
        if let Ok((min, max, mean)) = scan.min_max_mean() {
            debug!(
                "{label}: {} {:?} min={min:.3} max={max:.3} mean={mean:.3}",
                self.unit,
                self.shape()
            );
        }
    }
}

impl ImageArray<u32> {
    /// Largest value in the image
    pub fn max_value(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Values converted to `f64` for statistics
    pub fn to_f64(&self) -> ArrayD<f64> {
        self.data.mapv(f64::from)
    }
}
