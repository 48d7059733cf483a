//! Integer line rasterization in any number of dimensions.

use ndarray::ArrayD;

use crate::error::{Result, SimError};

fn check_rank(start: &[i64], end: &[i64]) -> Result<()> {
    if start.len() != end.len() {
        return Err(SimError::InvalidSample(format!(
            "line endpoints have {} and {} coordinates",
            start.len(),
            end.len()
        )));
    }
    Ok(())
}

/// Voxels visited by a Bresenham line from `start` to `end`, both inclusive.
///
/// The axis with the largest displacement drives the walk; every other axis
/// keeps its own error term, so the line visits exactly `max(|end - start|) + 1`
/// voxels and steps at most one voxel per axis at a time. The result holds
/// one entry per visited voxel, so callers drawing into a bounded array
/// should go through [`draw_line`], which clips first.
pub fn bresenham_line(start: &[i64], end: &[i64]) -> Result<Vec<Vec<i64>>> {
    check_rank(start, end)?;

    let deltas: Vec<u64> = start.iter().zip(end).map(|(a, b)| a.abs_diff(*b)).collect();
    let steps: Vec<i64> = start.iter().zip(end).map(|(a, b)| b.cmp(a) as i64).collect();

    let Some((driver, &major)) = deltas.iter().enumerate().max_by_key(|(_, d)| **d) else {
        return Ok(Vec::new());
    };

    // i128 keeps the doubled error terms exact for any i64 endpoints
    let major = i128::from(major);
    let deltas: Vec<i128> = deltas.into_iter().map(i128::from).collect();
    let mut errors: Vec<i128> = deltas.iter().map(|d| 2 * d - major).collect();
    let mut point = start.to_vec();
    let mut points = Vec::new();
    points.push(point.clone());

    for _ in 0..major {
        point[driver] += steps[driver];
        for axis in 0..point.len() {
            if axis == driver {
                continue;
            }
            if errors[axis] >= 0 {
                point[axis] += steps[axis];
                errors[axis] -= 2 * major;
            }
            errors[axis] += 2 * deltas[axis];
        }
        points.push(point.clone());
    }

    Ok(points)
}

/// Clip the segment `start..end` to the voxel box `[0, n - 1]` per axis
/// (Liang-Barsky), returning rounded endpoints inside the box.
fn clip_to_shape(start: &[i64], end: &[i64], shape: &[usize]) -> Option<(Vec<i64>, Vec<i64>)> {
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    for axis in 0..shape.len() {
        let p = start[axis] as f64;
        let d = end[axis] as f64 - p;
        let hi = shape[axis] as f64 - 1.0;
        if d == 0.0 {
            if p < 0.0 || p > hi {
                return None;
            }
            continue;
        }
        let (a, b) = ((0.0 - p) / d, (hi - p) / d);
        t0 = t0.max(a.min(b));
        t1 = t1.min(a.max(b));
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| -> Vec<i64> {
        (0..shape.len())
            .map(|axis| {
                let p = start[axis] as f64;
                let d = end[axis] as f64 - p;
                let hi = shape[axis] as f64 - 1.0;
                (p + t * d).round().clamp(0.0, hi) as i64
            })
            .collect()
    };
    Some((at(t0), at(t1)))
}

/// Add `value` to every voxel of `array` on the line from `start` to `end`.
///
/// Segments reaching outside the array are clipped to it before they are
/// walked, so the cost depends on the array size, not the line length.
/// Returns the number of voxels drawn.
///
/// # Errors
/// `InvalidSample` if the endpoints do not match the array rank.
pub fn draw_line(array: &mut ArrayD<f64>, start: &[i64], end: &[i64], value: f64) -> Result<usize> {
    check_rank(start, end)?;
    if start.len() != array.ndim() {
        return Err(SimError::InvalidSample(format!(
            "{}-D line drawn into a {}-D array",
            start.len(),
            array.ndim()
        )));
    }

    let shape = array.shape().to_vec();
    let inside = |p: &[i64]| p.iter().zip(&shape).all(|(&p, &n)| p >= 0 && (p as u64) < n as u64);
    let (start, end) = if inside(start) && inside(end) {
        (start.to_vec(), end.to_vec())
    } else {
        match clip_to_shape(start, end, &shape) {
            Some(clipped) => clipped,
            None => return Ok(0),
        }
    };

    let mut drawn = 0;
    for point in bresenham_line(&start, &end)? {
        if !inside(point.as_slice()) {
            continue;
        }
        let index: Vec<usize> = point.iter().map(|&p| p as usize).collect();
        array[index.as_slice()] += value;
        drawn += 1;
    }

    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_diagonal_2d() {
        let n = 100;
        let mut a = ArrayD::<f64>::zeros(IxDyn(&[n, n]));
        let last = n as i64 - 1;
        draw_line(&mut a, &[0, 0], &[last, last], 1.0).unwrap();

        let mut expect = ArrayD::<f64>::zeros(IxDyn(&[n, n]));
        for i in 0..n {
            expect[[i, i]] = 1.0;
        }
        assert_eq!(a, expect);
    }

    #[test]
    fn test_diagonal_3d() {
        let n = 100;
        let mut a = ArrayD::<f64>::zeros(IxDyn(&[n, n, n]));
        let last = n as i64 - 1;
        draw_line(&mut a, &[0, 0, 0], &[last, last, last], 1.0).unwrap();

        let mut expect = ArrayD::<f64>::zeros(IxDyn(&[n, n, n]));
        for i in 0..n {
            expect[[i, i, i]] = 1.0;
        }
        assert_eq!(a, expect);
    }

    #[test]
    fn test_shallow_line_is_connected() {
        let points = bresenham_line(&[2, 1], &[-3, 9]).unwrap();
        assert_eq!(points.len(), 9);
        assert_eq!(points.first().unwrap(), &vec![2, 1]);
        assert_eq!(points.last().unwrap(), &vec![-3, 9]);
        for pair in points.windows(2) {
            for axis in 0..2 {
                assert!((pair[1][axis] - pair[0][axis]).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_single_point() {
        assert_eq!(
            bresenham_line(&[4, 5, 6], &[4, 5, 6]).unwrap(),
            vec![vec![4, 5, 6]]
        );
    }

    #[test]
    fn test_clipped_to_array() {
        let mut a = ArrayD::<f64>::zeros(IxDyn(&[5, 5]));
        let drawn = draw_line(&mut a, &[-3, 2], &[8, 2], 2.0).unwrap();
        assert_eq!(drawn, 5);
        assert_eq!(a.sum(), 10.0);
        assert!((0..5).all(|i| a[[i, 2]] == 2.0));
    }

    #[test]
    fn test_extreme_endpoints_are_clipped() {
        let mut a = ArrayD::<f64>::zeros(IxDyn(&[8, 8]));
        let drawn = draw_line(&mut a, &[3, 3], &[i64::MAX, i64::MIN], 1.0).unwrap();
        assert!(drawn >= 1 && drawn <= 8, "{drawn}");
        assert_eq!(a[[3, 3]], 1.0);
        assert_eq!(a.sum(), drawn as f64);

        let drawn = draw_line(&mut a, &[i64::MIN, 4], &[i64::MAX, 4], 1.0).unwrap();
        assert_eq!(drawn, 8);
    }

    #[test]
    fn test_line_missing_the_array() {
        let mut a = ArrayD::<f64>::zeros(IxDyn(&[4, 4]));
        assert_eq!(draw_line(&mut a, &[-5, -5], &[-1, 9], 1.0).unwrap(), 0);
        assert_eq!(a.sum(), 0.0);
    }

    #[test]
    fn test_rank_mismatch_is_an_error() {
        assert!(matches!(
            bresenham_line(&[0, 0], &[1, 1, 1]),
            Err(SimError::InvalidSample(_))
        ));
        let mut a = ArrayD::<f64>::zeros(IxDyn(&[4, 4]));
        assert!(matches!(
            draw_line(&mut a, &[0, 0, 0], &[1, 1, 1], 1.0),
            Err(SimError::InvalidSample(_))
        ));
    }
}
