//! Detector models and the camera noise pipeline

pub mod camera;
pub mod sensor_noise;

pub use camera::{models, CameraModel, GainModel};
pub use sensor_noise::{simulate_camera, CameraFrame, NoiseStage};
