//! Discrete probability mass functions over integer lags.
//!
//! Both the generation interval and the reporting delay are represented as a
//! [`Pmf`]. Construction validates the weights and stores them normalized.
//! [`discretize_continuous`] turns a continuous distribution into such
//! weights by double interval censoring.

use statrs::distribution::ContinuousCDF;

use crate::error::{Error, Result, ensure_positive};

/// Default tolerance on `|sum(weights) - 1|` accepted by [`Pmf::new`].
pub const DEFAULT_PMF_TOLERANCE: f64 = 1e-6;

/// Number of Simpson panels used for the censoring integral. Must be even.
const CENSORING_PANELS: usize = 64;

/// A validated, normalized probability mass function.
#[derive(Debug, Clone, PartialEq)]
pub struct Pmf {
    weights: Vec<f64>,
}

impl Pmf {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        Self::with_tolerance(weights, DEFAULT_PMF_TOLERANCE)
    }

    /// Validates `weights` against `tolerance` and rescales them to unit mass.
    pub fn with_tolerance(weights: Vec<f64>, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || !(0.0..1.0).contains(&tolerance) {
            return Err(Error::Domain(format!(
                "pmf tolerance must be in [0, 1), got {tolerance}"
            )));
        }
        check_weights(&weights)?;

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::InvalidDistribution("weights have no mass".to_string()));
        }
        if (total - 1.0).abs() > tolerance {
            return Err(Error::InvalidDistribution(format!(
                "weights sum to {total}, expected 1 within {tolerance}"
            )));
        }
        if total == 1.0 {
            return Ok(Self { weights });
        }
        tracing::debug!(total, len = weights.len(), "renormalizing pmf");
        Ok(Self {
            weights: weights.into_iter().map(|w| w / total).collect(),
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Always false: empty weights are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Expected lag when index `i` stands for lag `i + offset`.
    pub(crate) fn mean_lag(&self, offset: usize) -> f64 {
        self.weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * (i + offset) as f64)
            .sum()
    }
}

/// Rejects empty weight vectors and entries that are negative or non-finite.
pub(crate) fn check_weights(weights: &[f64]) -> Result<()> {
    if weights.is_empty() {
        return Err(Error::InvalidDistribution("pmf has no weights".to_string()));
    }
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(Error::InvalidDistribution(format!(
            "weight {i} is {w}; weights must be finite and >= 0"
        )));
    }
    Ok(())
}

/// Discretizes a non-negative continuous distribution onto `[0, max_delay]`
/// with interval width `step`.
///
/// Uses double interval censoring: the primary event time is uniform within
/// its interval, so the censored CDF at `t` is
/// `(1/step) * ∫_0^step F(t - u) du`. Entry `j` of the result is the mass
/// falling in `(j * step, (j + 1) * step]`, normalized by the censored mass
/// below `max_delay`.
///
/// `max_delay` must be a multiple of `step` and strictly larger than it.
pub fn discretize_continuous<D>(dist: &D, step: f64, max_delay: f64) -> Result<Vec<f64>>
where
    D: ContinuousCDF<f64, f64>,
{
    ensure_positive("step", step)?;
    if !max_delay.is_finite() || max_delay <= step {
        return Err(Error::Domain(format!(
            "max_delay must be finite and > step ({step}), got {max_delay}"
        )));
    }
    let ratio = max_delay / step;
    let n_steps = ratio.round();
    if (ratio - n_steps).abs() > 1e-8 * n_steps.max(1.0) {
        return Err(Error::Domain(format!(
            "max_delay ({max_delay}) must be a multiple of step ({step})"
        )));
    }
    let n_steps = n_steps as usize;

    let censored: Vec<f64> = (0..=n_steps)
        .map(|j| censored_cdf(dist, j as f64 * step, step))
        .collect();
    let total = censored[n_steps];
    if !total.is_finite() || total <= 0.0 {
        return Err(Error::InvalidDistribution(format!(
            "no probability mass below max_delay {max_delay}"
        )));
    }

    Ok(censored
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).max(0.0) / total)
        .collect())
}

fn censored_cdf<D>(dist: &D, t: f64, step: f64) -> f64
where
    D: ContinuousCDF<f64, f64>,
{
    let cdf = |x: f64| if x <= 0.0 { 0.0 } else { dist.cdf(x) };
    let h = step / CENSORING_PANELS as f64;

    // composite Simpson over u in [0, step]
    let mut acc = cdf(t) + cdf(t - step);
    for k in 1..CENSORING_PANELS {
        let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
        acc += weight * cdf(t - k as f64 * h);
    }
    acc * h / 3.0 / step
}
