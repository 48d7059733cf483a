//! Uniformly spaced N-dimensional coordinate grids.
//!
//! A [`Grid`] fixes the voxel shape of every array in a simulation together
//! with the physical size of one voxel along each axis (µm) and the physical
//! position of voxel zero. Axes are ordered slowest to fastest, so a volume
//! is `(z, y, x)` and a plane is `(y, x)`.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Immutable coordinate space shared by every stage of a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridRecord")]
pub struct Grid {
    shape: Vec<usize>,
    scale: Vec<f64>,
    origin: Vec<f64>,
}

/// Serialized form of a [`Grid`], checked on the way in
#[derive(Deserialize)]
struct GridRecord {
    shape: Vec<usize>,
    scale: Vec<f64>,
    #[serde(default)]
    origin: Option<Vec<f64>>,
}

impl TryFrom<GridRecord> for Grid {
    type Error = SimError;

    fn try_from(record: GridRecord) -> Result<Self> {
        let grid = Grid::new(&record.shape, &record.scale)?;
        match record.origin {
            Some(origin) => grid.with_origin(&origin),
            None => Ok(grid),
        }
    }
}

/// Build a grid from per-axis extents (voxels) and scales (µm per voxel)
pub fn make_grid(shape: &[usize], scale: &[f64]) -> Result<Grid> {
    Grid::new(shape, scale)
}

impl Grid {
    /// Create a grid with its first voxel at the physical origin
    ///
    /// # Errors
    /// * `InvalidShape` - empty shape, zero extent, or shape/scale length mismatch
    /// * `InvalidScale` - a scale that is zero, negative or not finite
    pub fn new(shape: &[usize], scale: &[f64]) -> Result<Self> {
        if shape.is_empty() {
            return Err(SimError::InvalidShape {
                shape: shape.to_vec(),
                reason: "a grid needs at least one axis".to_string(),
            });
        }
        if shape.len() != scale.len() {
            return Err(SimError::InvalidShape {
                shape: shape.to_vec(),
                reason: format!("{} axes but {} scales", shape.len(), scale.len()),
            });
        }
        if let Some(axis) = shape.iter().position(|&n| n == 0) {
            return Err(SimError::InvalidShape {
                shape: shape.to_vec(),
                reason: format!("axis {axis} has zero extent"),
            });
        }
        if let Some((axis, &value)) = scale
            .iter()
            .enumerate()
            .find(|(_, s)| !(s.is_finite() && **s > 0.0))
        {
            return Err(SimError::InvalidScale { axis, value });
        }

        Ok(Self {
            shape: shape.to_vec(),
            scale: scale.to_vec(),
            origin: vec![0.0; shape.len()],
        })
    }

    /// Same grid with voxel zero placed at `origin` (µm)
    pub fn with_origin(mut self, origin: &[f64]) -> Result<Self> {
        if origin.len() != self.ndim() {
            return Err(SimError::InvalidShape {
                shape: self.shape.clone(),
                reason: format!("origin has {} axes", origin.len()),
            });
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(SimError::InvalidShape {
                shape: self.shape.clone(),
                reason: "origin must be finite".to_string(),
            });
        }
        self.origin = origin.to_vec();
        Ok(self)
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Physical size of one voxel along each axis, µm
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    /// Total number of voxels
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical coordinates of every voxel along `axis`
    pub fn coords(&self, axis: usize) -> Vec<f64> {
        (0..self.shape[axis])
            .map(|i| self.origin[axis] + i as f64 * self.scale[axis])
            .collect()
    }

    /// Fractional voxel coordinates of a physical position
    pub fn voxel_coords(&self, position: &[f64]) -> Vec<f64> {
        position
            .iter()
            .enumerate()
            .map(|(axis, &p)| (p - self.origin[axis]) / self.scale[axis])
            .collect()
    }

    /// Physical center of the grid (midpoint between the first and last voxel)
    pub fn center(&self) -> Vec<f64> {
        (0..self.ndim())
            .map(|axis| self.origin[axis] + (self.shape[axis] - 1) as f64 * self.scale[axis] / 2.0)
            .collect()
    }

    /// Zero-filled array matching this grid
    pub fn zeros(&self) -> ArrayD<f64> {
        ArrayD::zeros(IxDyn(&self.shape))
    }

    /// Coarser grid where each voxel covers `factors[axis]` voxels of this one
    ///
    /// Trailing voxels that do not fill a whole block are dropped. The new
    /// origin sits at the center of the first block so physical positions
    /// stay aligned.
    pub fn downsample(&self, factors: &[usize]) -> Result<Grid> {
        if factors.len() != self.ndim() {
            return Err(SimError::InvalidShape {
                shape: self.shape.clone(),
                reason: format!("{} downsampling factors for {} axes", factors.len(), self.ndim()),
            });
        }

        let mut shape = Vec::with_capacity(self.ndim());
        let mut scale = Vec::with_capacity(self.ndim());
        let mut origin = Vec::with_capacity(self.ndim());

        for axis in 0..self.ndim() {
            let factor = factors[axis];
            if factor == 0 || factor > self.shape[axis] {
                return Err(SimError::InvalidShape {
                    shape: self.shape.clone(),
                    reason: format!("cannot downsample axis {axis} by {factor}"),
                });
            }
            shape.push(self.shape[axis] / factor);
            scale.push(self.scale[axis] * factor as f64);
            origin.push(self.origin[axis] + (factor - 1) as f64 * self.scale[axis] / 2.0);
        }

        Grid::new(&shape, &scale)?.with_origin(&origin)
    }
}
