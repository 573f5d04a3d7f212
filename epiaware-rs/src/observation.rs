//! Overdispersed count observations.
//!
//! Observed counts are negative binomial with mean `μ` and clustering factor
//! `α`, so that `Var = μ + α μ²`. [`DelayObservations`] links this model to
//! latent infections through an [`ObservationKernel`].

use nalgebra::DVector;
use rand::{Rng, distr::Distribution};
use rand_distr::{Gamma, Poisson};
use statrs::function::gamma::ln_gamma;

use crate::error::{Error, Result, ensure_positive};
use crate::kernel::ObservationKernel;

/// Added to expected observations so the count model always has a positive mean.
pub const DEFAULT_POS_SHIFT: f64 = 1e-6;

/// Negative binomial over failures `k` before `size` successes with success
/// probability `prob`, built from a mean and clustering factor.
///
/// Sampling uses the gamma–Poisson mixture.
#[derive(Debug, Clone)]
pub struct NegativeBinomial {
    mean: f64,
    cluster_factor: f64,
    size: f64,
    prob: f64,
    mixing: Gamma<f64>,
}

/// Negative binomial with mean `mu` and clustering factor `alpha`.
///
/// `size = 1 / alpha` and `prob = size / (size + mu)`. Both parameters must be
/// finite and strictly positive; the Poisson limit `alpha -> 0` is not
/// represented.
pub fn mean_dispersion_negative_binomial(mu: f64, alpha: f64) -> Result<NegativeBinomial> {
    let mean = ensure_positive("mean", mu)?;
    let cluster_factor = ensure_positive("clustering factor", alpha)?;
    let size = 1.0 / cluster_factor;
    let mixing = Gamma::new(size, mean / size)
        .map_err(|e| Error::Domain(format!("negative binomial ({mu}, {alpha}): {e}")))?;

    Ok(NegativeBinomial {
        mean,
        cluster_factor,
        size,
        prob: size / (size + mean),
        mixing,
    })
}

impl NegativeBinomial {
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn cluster_factor(&self) -> f64 {
        self.cluster_factor
    }

    pub fn variance(&self) -> f64 {
        self.mean + self.cluster_factor * self.mean * self.mean
    }

    /// Log probability of `k` counts.
    pub fn ln_pmf(&self, k: u64) -> f64 {
        let r = self.size;
        let kf = k as f64;
        // r ln(p) with p = r / (r + mean), kept stable when mean << r
        let mut lp = ln_gamma(kf + r) - ln_gamma(r) - ln_gamma(kf + 1.0)
            - r * (self.mean / r).ln_1p();
        if k > 0 {
            lp += kf * (self.mean.ln() - (r + self.mean).ln());
        }
        lp
    }

    pub fn pmf(&self, k: u64) -> f64 {
        self.ln_pmf(k).exp()
    }
}

impl Distribution<u64> for NegativeBinomial {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let lambda = self.mixing.sample(rng);
        if lambda <= 0.0 {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(poisson) => poisson.sample(rng) as u64,
            Err(_) => {
                tracing::warn!(lambda, "poisson rate out of range, using rounded rate");
                lambda.round() as u64
            }
        }
    }
}

/// Delayed, overdispersed observation of latent infections.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayObservations {
    kernel: ObservationKernel,
    cluster_factor: f64,
    pos_shift: f64,
}

impl DelayObservations {
    pub fn new(kernel: ObservationKernel, cluster_factor: f64) -> Result<Self> {
        Ok(Self {
            kernel,
            cluster_factor: ensure_positive("clustering factor", cluster_factor)?,
            pos_shift: DEFAULT_POS_SHIFT,
        })
    }

    pub fn with_pos_shift(mut self, pos_shift: f64) -> Result<Self> {
        self.pos_shift = check_pos_shift(pos_shift)?;
        Ok(self)
    }

    pub fn kernel(&self) -> &ObservationKernel {
        &self.kernel
    }

    pub fn cluster_factor(&self) -> f64 {
        self.cluster_factor
    }

    pub fn pos_shift(&self) -> f64 {
        self.pos_shift
    }

    pub fn expected_observations(&self, infections: &[f64]) -> Result<DVector<f64>> {
        Ok(self.kernel.apply(infections)?.add_scalar(self.pos_shift))
    }

    /// One count distribution per time step.
    pub fn distributions(&self, infections: &[f64]) -> Result<Vec<NegativeBinomial>> {
        self.expected_observations(infections)?
            .iter()
            .map(|mu| mean_dispersion_negative_binomial(*mu, self.cluster_factor))
            .collect()
    }

    /// Sum of log probabilities of the observed counts. `None` entries are
    /// missing observations and contribute nothing.
    pub fn log_likelihood(&self, infections: &[f64], observed: &[Option<u64>]) -> Result<f64> {
        if observed.len() != self.kernel.time_horizon() {
            return Err(Error::Domain(format!(
                "{} observations for a horizon of {}",
                observed.len(),
                self.kernel.time_horizon()
            )));
        }
        let dists = self.distributions(infections)?;
        Ok(dists
            .iter()
            .zip(observed)
            .filter_map(|(dist, y)| y.map(|k| dist.ln_pmf(k)))
            .sum())
    }

    pub fn simulate<R: Rng + ?Sized>(&self, infections: &[f64], rng: &mut R) -> Result<Vec<u64>> {
        Ok(self
            .distributions(infections)?
            .iter()
            .map(|dist| dist.sample(rng))
            .collect())
    }
}

pub(crate) fn check_pos_shift(pos_shift: f64) -> Result<f64> {
    if !pos_shift.is_finite() || pos_shift < 0.0 {
        return Err(Error::Domain(format!(
            "pos_shift must be finite and >= 0, got {pos_shift}"
        )));
    }
    Ok(pos_shift)
}
