//! Sparse delay-convolution kernel mapping latent to observed incidence.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::ContinuousCDF;

use crate::error::{Error, Result};
use crate::pmf::{DEFAULT_PMF_TOLERANCE, Pmf, check_weights, discretize_continuous};

/// Reporting or onset delay. Weight `k` is the probability of a delay of `k`
/// steps, starting at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayDistribution {
    pmf: Pmf,
}

impl DelayDistribution {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        Self::with_tolerance(weights, DEFAULT_PMF_TOLERANCE)
    }

    pub fn with_tolerance(weights: Vec<f64>, tolerance: f64) -> Result<Self> {
        Ok(Self {
            pmf: Pmf::with_tolerance(weights, tolerance)?,
        })
    }

    pub fn from_continuous<D>(dist: &D, step: f64, max_delay: f64) -> Result<Self>
    where
        D: ContinuousCDF<f64, f64>,
    {
        Self::new(discretize_continuous(dist, step, max_delay)?)
    }

    pub fn weights(&self) -> &[f64] {
        self.pmf.weights()
    }

    pub fn len(&self) -> usize {
        self.pmf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pmf.is_empty()
    }

    /// Mean delay in steps.
    pub fn mean(&self) -> f64 {
        self.pmf.mean_lag(0)
    }
}

/// Banded lower-triangular convolution operator stored in compressed sparse
/// row form.
///
/// Rows index observation time and columns index infection time:
/// `K[t, s] = delay[t - s]` for `0 <= t - s < delay.len()`. Every position in
/// the band is stored, including zero weights, so the number of stored entries
/// is `Σ_s min(delay.len(), time_horizon - s)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationKernel {
    time_horizon: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

/// Builds the kernel for `delay_pmf` over `time_horizon` steps.
///
/// Only non-negativity of the weights is checked; use
/// [`ObservationKernel::from_delay`] for a validated distribution.
pub fn build_kernel(delay_pmf: &[f64], time_horizon: usize) -> Result<ObservationKernel> {
    check_weights(delay_pmf)?;
    if time_horizon < 1 {
        return Err(Error::Domain("time_horizon must be >= 1".to_string()));
    }

    let band = delay_pmf.len();
    let capacity: usize = (0..time_horizon)
        .map(|s| band.min(time_horizon - s))
        .sum();
    let mut row_offsets = Vec::with_capacity(time_horizon + 1);
    let mut col_indices = Vec::with_capacity(capacity);
    let mut values = Vec::with_capacity(capacity);

    row_offsets.push(0);
    for row in 0..time_horizon {
        let first = (row + 1).saturating_sub(band);
        for col in first..=row {
            col_indices.push(col);
            values.push(delay_pmf[row - col]);
        }
        row_offsets.push(col_indices.len());
    }

    tracing::debug!(time_horizon, band, nnz = values.len(), "built observation kernel");
    Ok(ObservationKernel {
        time_horizon,
        row_offsets,
        col_indices,
        values,
    })
}

impl ObservationKernel {
    pub fn from_delay(delay: &DelayDistribution, time_horizon: usize) -> Result<Self> {
        build_kernel(delay.weights(), time_horizon)
    }

    pub fn time_horizon(&self) -> usize {
        self.time_horizon
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.time_horizon, self.time_horizon)
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.time_horizon {
            return 0.0;
        }
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        self.col_indices[range.clone()]
            .binary_search(&col)
            .map(|i| self.values[range.start + i])
            .unwrap_or(0.0)
    }

    /// Stored entries as `(row, col, value)` in row-major order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.time_horizon).flat_map(move |row| {
            (self.row_offsets[row]..self.row_offsets[row + 1])
                .map(move |i| (row, self.col_indices[i], self.values[i]))
        })
    }

    /// Expected observed incidence `K · incidence`.
    pub fn apply(&self, incidence: &[f64]) -> Result<DVector<f64>> {
        if incidence.len() != self.time_horizon {
            return Err(Error::Domain(format!(
                "incidence has {} steps, kernel expects {}",
                incidence.len(),
                self.time_horizon
            )));
        }
        Ok(DVector::from_fn(self.time_horizon, |row, _| {
            (self.row_offsets[row]..self.row_offsets[row + 1])
                .map(|i| self.values[i] * incidence[self.col_indices[i]])
                .sum()
        }))
    }

    /// Dense copy. Allocates `time_horizon^2` entries.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.time_horizon, self.time_horizon);
        for (row, col, value) in self.triplets() {
            dense[(row, col)] = value;
        }
        dense
    }
}
