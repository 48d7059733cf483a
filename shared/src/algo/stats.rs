//! StatsScan - single-pass summary statistics over floating point data
//!
//! Computes count, min, max, sum, mean and population variance in one pass
//! (Welford's update), so it can run over any iterator including array
//! views in logical order. Scanning stops at the first non-finite value and
//! its position is reported instead of a result.

use num_traits::float::Float;
use std::fmt;
use thiserror::Error;

/// Error types for StatsScan operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("Non-finite value encountered at index {0}")]
    NonFinite(usize),
    #[error("No data provided (empty input)")]
    NoData,
}

/// A scanner for statistics over floating point data
#[derive(Debug, Clone)]
pub struct StatsScan<T: Float> {
    min_value: Option<T>,
    max_value: Option<T>,
    sum: T,
    mean: T,
    m2: T,
    count: usize,
    non_finite_index: Option<usize>,
}

impl<T: Float + fmt::Debug> StatsScan<T> {
    /// Scan a slice of values
    pub fn new(data: &[T]) -> Self {
        Self::from_values(data.iter().copied())
    }

    /// Scan any sequence of values in a single pass
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut scan = Self {
            min_value: None,
            max_value: None,
            sum: T::zero(),
            mean: T::zero(),
            m2: T::zero(),
            count: 0,
            non_finite_index: None,
        };

        for (index, value) in values.into_iter().enumerate() {
            if !value.is_finite() {
                scan.non_finite_index = Some(index);
                break;
            }

            scan.count += 1;
            scan.sum = scan.sum + value;

            // Welford update keeps the variance stable for large offsets
            let n = T::from(scan.count).unwrap_or_else(T::one);
            let delta = value - scan.mean;
            scan.mean = scan.mean + delta / n;
            scan.m2 = scan.m2 + delta * (value - scan.mean);

            scan.min_value = Some(scan.min_value.map_or(value, |m| m.min(value)));
            scan.max_value = Some(scan.max_value.map_or(value, |m| m.max(value)));
        }

        scan
    }

    fn check(&self) -> Result<(), StatsError> {
        if let Some(index) = self.non_finite_index {
            Err(StatsError::NonFinite(index))
        } else if self.count == 0 {
            Err(StatsError::NoData)
        } else {
            Ok(())
        }
    }

    pub fn min(&self) -> Result<T, StatsError> {
        self.check()?;
        self.min_value.ok_or(StatsError::NoData)
    }

    pub fn max(&self) -> Result<T, StatsError> {
        self.check()?;
        self.max_value.ok_or(StatsError::NoData)
    }

    pub fn sum(&self) -> Result<T, StatsError> {
        self.check()?;
        Ok(self.sum)
    }

    pub fn mean(&self) -> Result<T, StatsError> {
        self.check()?;
        Ok(self.mean)
    }

    /// Population variance
    pub fn variance(&self) -> Result<T, StatsError> {
        self.check()?;
        let n = T::from(self.count).ok_or(StatsError::NoData)?;
        Ok(self.m2 / n)
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> Result<T, StatsError> {
        Ok(self.variance()?.sqrt())
    }

    /// Number of finite values scanned before stopping
    pub fn count(&self) -> usize {
        self.count
    }

    /// Position of the first NaN or infinity, if any
    pub fn non_finite_index(&self) -> Option<usize> {
        self.non_finite_index
    }

    /// Get min, max, and mean as a tuple
    pub fn min_max_mean(&self) -> Result<(T, T, T), StatsError> {
        Ok((self.min()?, self.max()?, self.mean()?))
    }
}
