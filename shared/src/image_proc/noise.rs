//! Noise generation utilities for detector simulation.
//!
//! Provides the stochastic primitives the camera model is built from:
//! - Poisson resampling of a mean image (photon shot noise)
//! - Additive Poisson noise with a constant mean (dark current, spurious charge)
//! - Additive zero-mean Gaussian noise (read noise)
//! - Gamma-distributed electron multiplication (EM gain register)
//!
//! Every function takes an [`ElementStreams`] handle instead of owning an RNG,
//! so each element's draws are fixed by the seed and its position alone and
//! the rayon chunking never changes the result.

use crate::algo::parallel::{sample_per_element, ElementStreams};
use ndarray::ArrayD;
use rand::Rng;
use rand_distr::{Distribution, Gamma, Normal, Poisson, StandardNormal};

/// Draw one Poisson sample with the given mean.
///
/// Non-positive means yield zero. Means beyond the range `rand_distr`
/// supports fall back to the normal approximation, which is exact to far
/// better than one count at that scale.
pub fn poisson_sample<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> f64 {
    if mean <= 0.0 {
        return 0.0;
    }

    match Poisson::new(mean) {
        Ok(poisson) => poisson.sample(rng),
        Err(_) => match Normal::new(mean, mean.sqrt()) {
            Ok(normal) => normal.sample(rng).max(0.0).round(),
            Err(_) => mean,
        },
    }
}

/// Draw the output of an electron-multiplying register.
///
/// For `electrons` input charges and mean gain `gain` the output follows
/// Gamma(shape = electrons, scale = gain), the standard high-gain model.
pub fn em_gain_sample<R: Rng + ?Sized>(electrons: f64, gain: f64, rng: &mut R) -> f64 {
    if electrons <= 0.0 {
        return 0.0;
    }

    match Gamma::new(electrons, gain) {
        Ok(gamma) => gamma.sample(rng),
        Err(_) => electrons * gain,
    }
}

/// Apply Poisson arrival statistics to a mean image
///
/// Each element is treated as the mean of an independent Poisson
/// distribution; elements with non-positive mean become zero.
///
/// # Arguments
/// * `mean_image` - Expected counts per element
/// * `streams` - Per-element random streams
/// * `rows_per_chunk` - Optional parallel chunk size along axis 0
pub fn apply_poisson_noise(
    mean_image: &ArrayD<f64>,
    streams: &ElementStreams,
    rows_per_chunk: Option<usize>,
) -> ArrayD<f64> {
    sample_per_element(mean_image, streams, rows_per_chunk, |mean, rng| {
        poisson_sample(mean, rng)
    })
}

/// Add independent Poisson(`mean`) counts to every element
///
/// A zero mean returns an unchanged copy without touching the streams.
pub fn add_poisson_noise(
    image: &ArrayD<f64>,
    mean: f64,
    streams: &ElementStreams,
    rows_per_chunk: Option<usize>,
) -> ArrayD<f64> {
    if mean <= 0.0 {
        return image.to_owned();
    }

    match Poisson::new(mean) {
        Ok(poisson) => sample_per_element(image, streams, rows_per_chunk, |value, rng| {
            value + poisson.sample(rng)
        }),
        Err(_) => sample_per_element(image, streams, rows_per_chunk, |value, rng| {
            value + poisson_sample(mean, rng)
        }),
    }
}

/// Add zero-mean Gaussian noise with standard deviation `std_dev`
pub fn add_gaussian_noise(
    image: &ArrayD<f64>,
    std_dev: f64,
    streams: &ElementStreams,
    rows_per_chunk: Option<usize>,
) -> ArrayD<f64> {
    if std_dev <= 0.0 {
        return image.to_owned();
    }

    sample_per_element(image, streams, rows_per_chunk, |value, rng| {
        let z: f64 = rng.sample(StandardNormal);
        value + std_dev * z
    })
}

/// Pass every element through a stochastic EM gain register
pub fn apply_em_gain(
    image: &ArrayD<f64>,
    gain: f64,
    streams: &ElementStreams,
    rows_per_chunk: Option<usize>,
) -> ArrayD<f64> {
    sample_per_element(image, streams, rows_per_chunk, |electrons, rng| {
        em_gain_sample(electrons, gain, rng)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::StatsScan;
    use approx::assert_relative_eq;
    use ndarray::IxDyn;

    fn filled(shape: &[usize], value: f64) -> ArrayD<f64> {
        ArrayD::from_elem(IxDyn(shape), value)
    }

    fn stats(image: &ArrayD<f64>) -> (f64, f64) {
        let scan = StatsScan::from_values(image.iter().copied());
        (scan.mean().unwrap(), scan.variance().unwrap())
    }

    #[test]
    fn test_poisson_mean_and_variance() {
        let streams = ElementStreams::new(42, 0);
        let noisy = apply_poisson_noise(&filled(&[200, 200], 25.0), &streams, None);

        let (mean, variance) = stats(&noisy);
        assert_relative_eq!(mean, 25.0, epsilon = 0.15);
        assert_relative_eq!(variance, 25.0, epsilon = 1.0);
        assert!(noisy.iter().all(|v| *v >= 0.0 && v.fract() == 0.0));
    }

    #[test]
    fn test_poisson_zero_and_negative_means() {
        let streams = ElementStreams::new(1, 0);
        let mut mean = filled(&[4, 4], 0.0);
        mean[[0, 0]] = -3.0;

        let noisy = apply_poisson_noise(&mean, &streams, None);
        assert!(noisy.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_add_poisson_zero_mean_is_identity() {
        let streams = ElementStreams::new(9, 0);
        let image = filled(&[8, 8], 3.5);
        assert_eq!(add_poisson_noise(&image, 0.0, &streams, None), image);
    }

    #[test]
    fn test_add_poisson_shifts_mean() {
        let streams = ElementStreams::new(11, 0);
        let image = filled(&[128, 128], 10.0);
        let noisy = add_poisson_noise(&image, 4.0, &streams, None);

        let (mean, variance) = stats(&noisy);
        assert_relative_eq!(mean, 14.0, epsilon = 0.1);
        assert_relative_eq!(variance, 4.0, epsilon = 0.3);
    }

    #[test]
    fn test_gaussian_noise_statistics() {
        let streams = ElementStreams::new(12, 0);
        let noisy = add_gaussian_noise(&filled(&[256, 128], 100.0), 3.0, &streams, None);

        let (mean, variance) = stats(&noisy);
        assert_relative_eq!(mean, 100.0, epsilon = 0.1);
        assert_relative_eq!(variance, 9.0, epsilon = 0.4);
    }

    #[test]
    fn test_em_gain_statistics() {
        let streams = ElementStreams::new(13, 0);
        let noisy = apply_em_gain(&filled(&[128, 128], 10.0), 100.0, &streams, None);

        // Gamma(k, theta): mean k*theta, variance k*theta^2
        let (mean, variance) = stats(&noisy);
        assert_relative_eq!(mean, 1000.0, max_relative = 0.02);
        assert_relative_eq!(variance, 100_000.0, max_relative = 0.08);
    }

    #[test]
    fn test_huge_mean_does_not_panic() {
        let mut rng = ElementStreams::new(0, 0).rng_for(0);
        let sample = poisson_sample(1e20, &mut rng);
        assert!(sample.is_finite() && sample > 0.0);
    }
}
