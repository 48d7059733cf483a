//! Specimen descriptions rendered to ground-truth photon flux.
//!
//! Any type implementing [`Renderable`] can act as a sample. The [`Sample`]
//! enum bundles the built-in geometries so they can be stored and
//! serialized uniformly. All renderers are deterministic: randomized
//! geometries carry their own seed.

pub mod bresenham;
pub mod lines;
pub mod points;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError, Stage};
use crate::image::FluxImage;
use crate::space::Grid;
use crate::units::Unit;

pub use bresenham::{bresenham_line, draw_line};
pub use lines::FilamentLines;
pub use points::{PointSource, PointSources};

/// Something that can produce a photon-flux density over a grid
pub trait Renderable: Send + Sync {
    /// Render this sample as photons per second per voxel.
    ///
    /// Implementations must return a non-negative, finite image over exactly
    /// `grid`, tagged [`Unit::PhotonFlux`].
    fn render(&self, grid: &Grid) -> Result<FluxImage>;
}

/// Built-in sample geometries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sample {
    PointSources(PointSources),
    FilamentLines(FilamentLines),
}

impl Renderable for Sample {
    fn render(&self, grid: &Grid) -> Result<FluxImage> {
        match self {
            Sample::PointSources(points) => points.render(grid),
            Sample::FilamentLines(lines) => lines.render(grid),
        }
    }
}

impl From<PointSources> for Sample {
    fn from(points: PointSources) -> Self {
        Sample::PointSources(points)
    }
}

impl From<FilamentLines> for Sample {
    fn from(lines: FilamentLines) -> Self {
        Sample::FilamentLines(lines)
    }
}

/// Render `sample` onto `grid` and verify the result honours the contract.
///
/// # Errors
/// Propagates the renderer's own error, or returns `ShapeMismatch`,
/// `WrongUnit`, `NonFinite` or `NegativeFlux` when a renderer breaks its
/// output contract.
pub fn render<S: Renderable + ?Sized>(sample: &S, grid: &Grid) -> Result<FluxImage> {
    let image = sample.render(grid)?;

    if image.grid() != grid {
        return Err(SimError::ShapeMismatch {
            stage: Stage::Sample,
            expected: grid.shape().to_vec(),
            found: image.shape().to_vec(),
        });
    }
    image.expect_unit(Unit::PhotonFlux, Stage::Sample)?;
    image.check_non_negative(Stage::Sample)?;

    image.log_summary("rendered sample");
    Ok(image)
}
