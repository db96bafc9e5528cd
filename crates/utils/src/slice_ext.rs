use crate::error::{Error, Result};

/// Extends functionality for slices of float arrays
pub trait SliceExt<T> {
    /// Find the minimum value in float arrays
    ///
    /// Only provides the minimum value from a collection of valid numbers. Any
    /// NAN values, infinite values, or empty slices will return an error.
    ///
    /// ```rust
    /// # use rrtools_utils::{Error, SliceExt};
    /// assert_eq!([1.1, 0.5, 2.2].try_min(), Ok(0.5));
    /// assert_eq!([1.1, f64::NAN].try_min(), Err(Error::SliceContainsUndefinedValues));
    /// assert_eq!(Vec::<f64>::new().try_min(), Err(Error::SliceContainsNoValues));
    /// ```
    fn try_min(&self) -> Result<T>;

    /// Find the maximum value in float arrays
    ///
    /// Same rules as [try_min()](SliceExt::try_min).
    ///
    /// ```rust
    /// # use rrtools_utils::{Error, SliceExt};
    /// assert_eq!([1.1, 0.5, 2.2].try_max(), Ok(2.2));
    /// assert_eq!([1.1, f64::INFINITY].try_max(), Err(Error::SliceContainsUndefinedValues));
    /// ```
    fn try_max(&self) -> Result<T>;

    /// Weighted arithmetic mean of the values
    ///
    /// Weights must be non-negative and have a positive sum. This is used to
    /// combine per-worker rates, where each rate is weighted by the number of
    /// rays that worker traced.
    ///
    /// ```rust
    /// # use rrtools_utils::SliceExt;
    /// let rates = [0.25, 0.5];
    /// assert_eq!(rates.weighted_mean(&[3.0, 1.0]), Ok(0.3125));
    /// assert!(rates.weighted_mean(&[0.0, 0.0]).is_err());
    /// ```
    fn weighted_mean(&self, weights: &[T]) -> Result<T>;

    /// Largest relative change between this slice and a previous estimate
    ///
    /// Elements where the current value is exactly zero are skipped, since a
    /// relative change is undefined there. An all-zero slice has no change.
    ///
    /// ```rust
    /// # use rrtools_utils::SliceExt;
    /// let current = [2.0, 4.0, 0.0];
    /// let previous = [1.0, 4.0, 3.0];
    /// assert_eq!(current.max_relative_change(&previous), Ok(0.5));
    /// ```
    fn max_relative_change(&self, previous: &[T]) -> Result<T>;
}

impl SliceExt<f64> for [f64] {
    fn try_min(&self) -> Result<f64> {
        if self.iter().any(|v| !v.is_finite()) {
            return Err(Error::SliceContainsUndefinedValues);
        };

        self.iter()
            .min_by(|a, b| a.total_cmp(b))
            .copied()
            .ok_or(Error::SliceContainsNoValues)
    }

    fn try_max(&self) -> Result<f64> {
        if self.iter().any(|v| !v.is_finite()) {
            return Err(Error::SliceContainsUndefinedValues);
        };

        self.iter()
            .max_by(|a, b| a.total_cmp(b))
            .copied()
            .ok_or(Error::SliceContainsNoValues)
    }

    fn weighted_mean(&self, weights: &[f64]) -> Result<f64> {
        check_lengths(self.len(), weights.len())?;

        if self.is_empty() {
            return Err(Error::SliceContainsNoValues);
        }

        if self.iter().chain(weights).any(|v| !v.is_finite()) {
            return Err(Error::SliceContainsUndefinedValues);
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 || weights.iter().any(|w| *w < 0.0) {
            return Err(Error::InvalidWeights);
        }

        let sum: f64 = self.iter().zip(weights).map(|(v, w)| v * w).sum();
        Ok(sum / total)
    }

    fn max_relative_change(&self, previous: &[f64]) -> Result<f64> {
        check_lengths(self.len(), previous.len())?;

        if self.iter().chain(previous).any(|v| !v.is_finite()) {
            return Err(Error::SliceContainsUndefinedValues);
        }

        Ok(self
            .iter()
            .zip(previous)
            .filter(|(current, _)| **current != 0.0)
            .map(|(current, prev)| ((current - prev) / current).abs())
            .fold(0.0, f64::max))
    }
}

fn check_lengths(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::SliceLengthMismatch { expected, found });
    }
    Ok(())
}
