//! Image-level processing primitives.

pub mod noise;

pub use noise::{
    add_gaussian_noise, add_poisson_noise, apply_em_gain, apply_poisson_noise, em_gain_sample,
    poisson_sample,
};
