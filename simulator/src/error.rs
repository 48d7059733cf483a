//! Error taxonomy for the simulation pipeline.
//!
//! Every failure names the stage it came from and falls into one of three
//! kinds: bad configuration (rejected at construction or validation), bad
//! input data shape or units, and numerical impossibility (negative flux,
//! NaN or infinity). No stage recovers from another stage's error.

use std::fmt;

use shared::algo::ChunkError;
use thiserror::Error;

use crate::units::Unit;

/// Pipeline stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Grid,
    Sample,
    Psf,
    Convolution,
    Camera,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Stage::Grid => "grid",
            Stage::Sample => "sample",
            Stage::Psf => "psf",
            Stage::Convolution => "convolution",
            Stage::Camera => "camera",
        };
        write!(f, "{name}")
    }
}

/// Broad class of an error, for callers that branch on cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid grid, sample, PSF or camera parameters
    Configuration,
    /// Mismatched array shapes or unit tags between stages
    Shape,
    /// Negative flux or non-finite values
    Numeric,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("[grid] invalid shape {shape:?}: {reason}")]
    InvalidShape { shape: Vec<usize>, reason: String },

    #[error("[grid] invalid scale {value} on axis {axis}: scale must be finite and positive")]
    InvalidScale { axis: usize, value: f64 },

    #[error("[sample] invalid sample: {0}")]
    InvalidSample(String),

    #[error("[psf] invalid PSF spec: {0}")]
    InvalidPsfSpec(String),

    #[error("[camera] invalid camera model: {0}")]
    InvalidCameraModel(String),

    #[error("[{stage}] invalid chunk layout: {source}")]
    InvalidChunking { stage: Stage, source: ChunkError },

    #[error("[{stage}] PSF sampling of {psf_um} µm disagrees with grid scale {grid_um} µm on axis {axis}")]
    UnitMismatch {
        stage: Stage,
        axis: usize,
        psf_um: f64,
        grid_um: f64,
    },

    #[error("[{stage}] expected {expected} input, found {found}")]
    WrongUnit {
        stage: Stage,
        expected: Unit,
        found: Unit,
    },

    #[error("[{stage}] shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        stage: Stage,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("[{stage}] image has non-positive dimensions {shape:?}")]
    EmptyImage { stage: Stage, shape: Vec<usize> },

    #[error("[{stage}] negative photon flux {value} at index {index:?}")]
    NegativeFlux {
        stage: Stage,
        index: Vec<usize>,
        value: f64,
    },

    #[error("[{stage}] non-finite value {value} at index {index:?}")]
    NonFinite {
        stage: Stage,
        index: Vec<usize>,
        value: f64,
    },

    #[error("[{stage}] invalid PSF kernel: {reason}")]
    InvalidKernel { stage: Stage, reason: String },
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::InvalidShape { .. }
            | SimError::InvalidScale { .. }
            | SimError::InvalidSample(_)
            | SimError::InvalidPsfSpec(_)
            | SimError::InvalidCameraModel(_)
            | SimError::InvalidChunking { .. }
            | SimError::UnitMismatch { .. } => ErrorKind::Configuration,
            SimError::WrongUnit { .. }
            | SimError::ShapeMismatch { .. }
            | SimError::EmptyImage { .. } => ErrorKind::Shape,
            SimError::NegativeFlux { .. }
            | SimError::NonFinite { .. }
            | SimError::InvalidKernel { .. } => ErrorKind::Numeric,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            SimError::InvalidShape { .. } | SimError::InvalidScale { .. } => Stage::Grid,
            SimError::InvalidSample(_) => Stage::Sample,
            SimError::InvalidPsfSpec(_) => Stage::Psf,
            SimError::InvalidCameraModel(_) => Stage::Camera,
            SimError::InvalidChunking { stage, .. }
            | SimError::UnitMismatch { stage, .. }
            | SimError::WrongUnit { stage, .. }
            | SimError::ShapeMismatch { stage, .. }
            | SimError::EmptyImage { stage, .. }
            | SimError::NegativeFlux { stage, .. }
            | SimError::NonFinite { stage, .. }
            | SimError::InvalidKernel { stage, .. } => *stage,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_stages() {
        let err = SimError::NegativeFlux {
            stage: Stage::Camera,
            index: vec![1, 2],
            value: -1.0,
        };
        assert_eq!(err.kind(), ErrorKind::Numeric);
        assert_eq!(err.stage(), Stage::Camera);

        let err = SimError::InvalidScale {
            axis: 0,
            value: 0.0,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.stage(), Stage::Grid);
    }

    #[test]
    fn test_messages_name_the_stage() {
        let err = SimError::WrongUnit {
            stage: Stage::Convolution,
            expected: Unit::PhotonFlux,
            found: Unit::Electrons,
        };
        let message = err.to_string();
        assert!(message.starts_with("[convolution]"), "{message}");
        assert!(message.contains("photon flux"), "{message}");
    }
}
