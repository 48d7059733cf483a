//! N-dimensional complex FFT built from 1-D `rustfft` transforms.
//!
//! Each axis is transformed in turn; the lanes along that axis are
//! independent and processed on the rayon pool.

use ndarray::{ArrayD, Axis, Zip};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

/// Transform `data` in place along every axis.
///
/// The inverse transform is scaled by `1 / len` so that a forward/inverse
/// pair reproduces the input.
pub fn fft_nd(data: &mut ArrayD<Complex64>, direction: FftDirection, planner: &mut FftPlanner<f64>) {
    for axis in 0..data.ndim() {
        let n = data.len_of(Axis(axis));
        if n <= 1 {
            continue;
        }
        let fft = planner.plan_fft(n, direction);

        Zip::from(data.lanes_mut(Axis(axis))).par_for_each(|mut lane| {
            let mut buffer: Vec<Complex64> = lane.iter().copied().collect();
            fft.process(&mut buffer);
            for (dst, src) in lane.iter_mut().zip(buffer) {
                *dst = src;
            }
        });
    }

    if direction == FftDirection::Inverse && !data.is_empty() {
        let norm = 1.0 / data.len() as f64;
        data.par_mapv_inplace(|z| z * norm);
    }
}
