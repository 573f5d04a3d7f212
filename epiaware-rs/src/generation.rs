//! Generation interval and the growth rate / reproduction number conversion.
//!
//! The two quantities are linked through the negative moment generating
//! function of the discretized generation interval,
//! `G(r) = Σ_i w_i e^{-r i Δd}`, by `R = 1 / G(r)`.

use statrs::distribution::ContinuousCDF;

use crate::error::{Error, Result, ensure_positive};
use crate::pmf::{DEFAULT_PMF_TOLERANCE, Pmf, discretize_continuous};

/// Newton iterations applied after the closed-form initial guess.
pub const DEFAULT_NEWTON_STEPS: usize = 2;

/// Discretized generation interval. Weight `i` is the probability of lag
/// `(i + 1) * step`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationInterval {
    pmf: Pmf,
    step: f64,
}

impl GenerationInterval {
    /// Unit step, default tolerance.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        Self::with_step(weights, 1.0, DEFAULT_PMF_TOLERANCE)
    }

    pub fn with_step(weights: Vec<f64>, step: f64, tolerance: f64) -> Result<Self> {
        let step = ensure_positive("generation interval step", step)?;
        Ok(Self {
            pmf: Pmf::with_tolerance(weights, tolerance)?,
            step,
        })
    }

    /// Discretizes a continuous generation time distribution.
    ///
    /// The mass censored into the zero lag is dropped and the remainder
    /// renormalized, since a secondary infection cannot occur in the same
    /// step as its primary.
    pub fn from_continuous<D>(dist: &D, step: f64, max_delay: f64) -> Result<Self>
    where
        D: ContinuousCDF<f64, f64>,
    {
        let mut weights = discretize_continuous(dist, step, max_delay)?;
        weights.remove(0);
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::InvalidDistribution(
                "generation interval has no mass beyond lag zero".to_string(),
            ));
        }
        weights.iter_mut().for_each(|w| *w /= total);
        Self::with_step(weights, step, DEFAULT_PMF_TOLERANCE)
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

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Mean generation time in time units.
    pub fn mean(&self) -> f64 {
        self.pmf.mean_lag(1) * self.step
    }

    /// `Σ_i w_i (i Δd)^2`.
    pub fn second_moment(&self) -> f64 {
        self.lags().map(|(w, t)| w * t * t).sum()
    }

    /// `G(r)` evaluated with this interval's step.
    pub fn neg_mgf(&self, r: f64) -> f64 {
        self.lags().map(|(w, t)| w * (-r * t).exp()).sum()
    }

    /// `G'(r)` evaluated with this interval's step.
    pub fn dneg_mgf(&self, r: f64) -> f64 {
        -self.lags().map(|(w, t)| w * t * (-r * t).exp()).sum::<f64>()
    }

    fn lags(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.weights()
            .iter()
            .enumerate()
            .map(|(i, w)| (*w, (i + 1) as f64 * self.step))
    }
}

/// Negative moment generating function `Σ_i w_i e^{-r i}` over unit lags
/// `1..=w.len()`.
///
/// Terms that underflow contribute zero.
pub fn neg_mgf(r: f64, w: &[f64]) -> f64 {
    w.iter()
        .enumerate()
        .map(|(i, w)| w * (-r * (i + 1) as f64).exp())
        .sum()
}

/// Derivative of [`neg_mgf`] with respect to `r`.
pub fn dneg_mgf(r: f64, w: &[f64]) -> f64 {
    -w.iter()
        .enumerate()
        .map(|(i, w)| {
            let lag = (i + 1) as f64;
            w * lag * (-r * lag).exp()
        })
        .sum::<f64>()
}

/// Reproduction number implied by exponential growth rate `r`.
pub fn growth_rate_to_reproduction(r: f64, gi: &GenerationInterval) -> f64 {
    1.0 / gi.neg_mgf(r)
}

/// Approximates the exponential growth rate implied by `r0`.
///
/// Solves `G(r) = 1 / r0` starting from the small-`r` root of the second
/// order Taylor expansion `G(r) ≈ 1 - m r + s r^2 / 2`, then applies exactly
/// `newton_steps` Newton iterations. The result is an approximation whose
/// accuracy is fixed by `newton_steps`, not a converged root.
pub fn reproduction_to_growth_rate(
    r0: f64,
    gi: &GenerationInterval,
    newton_steps: usize,
) -> Result<f64> {
    if !r0.is_finite() || r0 <= 0.0 {
        return Err(Error::NumericInstability(format!(
            "no real growth rate for reproduction number {r0}"
        )));
    }
    let target = 1.0 / r0;
    let mut r = small_r_approximation(r0, gi);

    for step in 0..newton_steps {
        let slope = gi.dneg_mgf(r);
        if !slope.is_finite() || slope == 0.0 {
            return Err(Error::NumericInstability(format!(
                "degenerate derivative {slope} at r = {r} (reproduction number {r0})"
            )));
        }
        r -= (gi.neg_mgf(r) - target) / slope;
        tracing::trace!(step, r, "newton update");
    }

    if !r.is_finite() {
        return Err(Error::NumericInstability(format!(
            "growth rate iteration diverged for reproduction number {r0}"
        )));
    }
    tracing::debug!(r0, r, newton_steps, "growth rate from reproduction number");
    Ok(r)
}

fn small_r_approximation(r0: f64, gi: &GenerationInterval) -> f64 {
    let m = gi.mean();
    let s = gi.second_moment();
    let c = 1.0 - 1.0 / r0;

    let discriminant = m * m - 2.0 * s * c;
    if discriminant >= 0.0 {
        // root continuous at r = 0, written to avoid cancellation
        2.0 * c / (m + discriminant.sqrt())
    } else {
        c / m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use statrs::distribution::Gamma;

    fn gi() -> GenerationInterval {
        GenerationInterval::new(vec![0.2, 0.3, 0.3, 0.15, 0.05]).unwrap()
    }

    #[test]
    fn test_neg_mgf_at_zero_is_total_mass() {
        assert_eq!(neg_mgf(0.0, &[0.25, 0.5, 0.25]), 1.0);
        assert_eq!(dneg_mgf(0.0, &[0.25, 0.5, 0.25]), -2.0);
    }

    #[test]
    fn test_neg_mgf_underflow_is_zero() {
        let value = neg_mgf(1e6, &[0.5, 0.5]);
        assert_eq!(value, 0.0);
        assert_eq!(dneg_mgf(1e6, &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn test_interval_mgf_matches_slice_mgf_for_unit_step() {
        let gi = gi();
        assert_relative_eq!(gi.neg_mgf(0.3), neg_mgf(0.3, gi.weights()), epsilon = 1e-15);
        assert_relative_eq!(gi.dneg_mgf(-0.2), dneg_mgf(-0.2, gi.weights()), epsilon = 1e-15);
    }

    #[test]
    fn test_zero_growth_is_reproduction_one() {
        let dyadic = GenerationInterval::new(vec![0.25, 0.5, 0.25]).unwrap();
        assert_eq!(growth_rate_to_reproduction(0.0, &dyadic), 1.0);
        assert_relative_eq!(growth_rate_to_reproduction(0.0, &gi()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reproduction_one_is_zero_growth() {
        let r = reproduction_to_growth_rate(1.0, &gi(), DEFAULT_NEWTON_STEPS).unwrap();
        assert!(r.abs() < 1e-12, "r was {r}");
    }

    #[test]
    fn test_single_lag_closed_form() {
        // G(r) = e^{-r Δd}  =>  r = ln(R) / Δd
        let gi = GenerationInterval::with_step(vec![1.0], 2.0, DEFAULT_PMF_TOLERANCE).unwrap();
        let r = reproduction_to_growth_rate(2.0, &gi, 6).unwrap();
        assert_relative_eq!(r, 2.0_f64.ln() / 2.0, epsilon = 1e-12);
        assert_relative_eq!(gi.mean(), 2.0);
        assert_relative_eq!(gi.second_moment(), 4.0);
    }

    #[test]
    fn test_newton_improves_on_initial_guess() {
        let gi = gi();
        let r0 = 1.3;
        let residual = |r: f64| (gi.neg_mgf(r) - 1.0 / r0).abs();
        let guess = reproduction_to_growth_rate(r0, &gi, 0).unwrap();
        let refined = reproduction_to_growth_rate(r0, &gi, DEFAULT_NEWTON_STEPS).unwrap();
        assert!(residual(refined) < residual(guess));
        assert!(residual(refined) < 1e-8);
    }

    #[test]
    fn test_non_positive_reproduction_fails() {
        for r0 in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                reproduction_to_growth_rate(r0, &gi(), DEFAULT_NEWTON_STEPS),
                Err(Error::NumericInstability(_))
            ));
        }
    }

    #[test]
    fn test_invalid_interval() {
        assert!(matches!(
            GenerationInterval::new(vec![0.5, 0.5, 0.5]),
            Err(Error::InvalidDistribution(_))
        ));
        assert!(matches!(
            GenerationInterval::with_step(vec![1.0], 0.0, DEFAULT_PMF_TOLERANCE),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn test_from_continuous_starts_at_lag_one() {
        let dist = Gamma::new(4.0, 1.0).unwrap();
        let gi = GenerationInterval::from_continuous(&dist, 1.0, 20.0).unwrap();
        assert_eq!(gi.len(), 19);
        assert_relative_eq!(gi.weights().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(gi.mean() > 3.5 && gi.mean() < 5.0, "mean was {}", gi.mean());
    }

    proptest! {
        #[test]
        fn prop_round_trip(r in -0.1_f64..0.15) {
            let gi = gi();
            let r0 = growth_rate_to_reproduction(r, &gi);
            let back = reproduction_to_growth_rate(r0, &gi, DEFAULT_NEWTON_STEPS).unwrap();
            prop_assert!((back - r).abs() < 1e-6, "r = {}, recovered {}", r, back);
        }

        #[test]
        fn prop_reproduction_increasing_in_growth_rate(r in -1.0_f64..1.0, dr in 1e-4_f64..0.5) {
            let gi = gi();
            prop_assert!(
                growth_rate_to_reproduction(r + dr, &gi) > growth_rate_to_reproduction(r, &gi)
            );
        }

        #[test]
        fn prop_neg_mgf_decreasing(r in -1.0_f64..1.0, dr in 1e-4_f64..0.5) {
            let gi = gi();
            prop_assert!(gi.neg_mgf(r + dr) < gi.neg_mgf(r));
        }
    }
}
