use rand::{Rng, distr::Distribution};
use rand_distr::LogNormal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result, ensure_positive},
    generation::{DEFAULT_NEWTON_STEPS, GenerationInterval, reproduction_to_growth_rate},
};

/// Maps an unconstrained trajectory value to a reproduction number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtTransform {
    /// Values are log reproduction numbers.
    #[default]
    Exp,
    Identity,
    /// `ln(1 + e^x)`
    Softplus,
}

impl RtTransform {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            RtTransform::Exp => x.exp(),
            RtTransform::Identity => x,
            RtTransform::Softplus => {
                if x > 30.0 {
                    x
                } else {
                    x.exp().ln_1p()
                }
            }
        }
    }
}

/// Prior on the incidence scale at the end of the seeding window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialisationPrior {
    /// Normal prior on the log scale.
    LogNormal { mu: f64, sigma: f64 },
    Fixed(f64),
}

impl Default for InitialisationPrior {
    fn default() -> Self {
        InitialisationPrior::LogNormal { mu: 0.0, sigma: 1.0 }
    }
}

impl InitialisationPrior {
    /// Rejects parameters for which the prior has no valid positive support.
    pub fn validate(&self) -> Result<()> {
        match *self {
            InitialisationPrior::LogNormal { mu, sigma } => {
                if !mu.is_finite() || !sigma.is_finite() || sigma < 0.0 {
                    return Err(Error::Domain(format!(
                        "initialisation prior needs finite mu and finite sigma >= 0, got ({mu}, {sigma})"
                    )));
                }
                Ok(())
            }
            InitialisationPrior::Fixed(scale) => {
                ensure_positive("initial incidence scale", scale).map(|_| ())
            }
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        self.validate()?;
        match *self {
            InitialisationPrior::LogNormal { mu, sigma } => {
                let dist = LogNormal::new(mu, sigma).map_err(|e| {
                    Error::Domain(format!("initialisation prior ({mu}, {sigma}): {e}"))
                })?;
                Ok(dist.sample(rng))
            }
            InitialisationPrior::Fixed(scale) => Ok(scale),
        }
    }
}

/// Latent infections: a seeding window followed by one value per simulated step.
#[derive(Debug, Clone, PartialEq)]
pub struct InfectionTrajectory {
    values: Vec<f64>,
    seed_len: usize,
}

impl InfectionTrajectory {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Seeded incidence, ending at time zero.
    pub fn seeding(&self) -> &[f64] {
        &self.values[..self.seed_len]
    }

    pub fn simulated(&self) -> &[f64] {
        &self.values[self.seed_len..]
    }

    pub fn seed_len(&self) -> usize {
        self.seed_len
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

/// Deterministic renewal-equation infection generator.
///
/// The only stochastic input is the seeding scale, which is either drawn from
/// the configured [`InitialisationPrior`] with a caller-supplied RNG or passed
/// in directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewalSimulator {
    generation_interval: GenerationInterval,
    transform: RtTransform,
    prior: InitialisationPrior,
    newton_steps: usize,
}

impl RenewalSimulator {
    pub fn new(
        generation_interval: GenerationInterval,
        transform: RtTransform,
        prior: InitialisationPrior,
    ) -> Self {
        Self {
            generation_interval,
            transform,
            prior,
            newton_steps: DEFAULT_NEWTON_STEPS,
        }
    }

    pub fn with_newton_steps(mut self, newton_steps: usize) -> Self {
        self.newton_steps = newton_steps;
        self
    }

    pub fn generation_interval(&self) -> &GenerationInterval {
        &self.generation_interval
    }

    pub fn transform(&self) -> RtTransform {
        self.transform
    }

    pub fn prior(&self) -> InitialisationPrior {
        self.prior
    }

    pub fn simulate<R: Rng + ?Sized>(
        &self,
        rt_unconstrained: &[f64],
        rng: &mut R,
    ) -> Result<InfectionTrajectory> {
        let scale = self.prior.sample(rng)?;
        self.simulate_with_scale(rt_unconstrained, scale)
    }

    /// Reproduction numbers after applying the configured transform.
    pub fn reproduction_numbers(&self, rt_unconstrained: &[f64]) -> Result<Vec<f64>> {
        if rt_unconstrained.is_empty() {
            return Err(Error::Domain(
                "reproduction number trajectory must have at least one step".to_string(),
            ));
        }
        rt_unconstrained
            .iter()
            .enumerate()
            .map(|(step, x)| {
                let rt = self.transform.apply(*x);
                if !rt.is_finite() || rt < 0.0 {
                    return Err(Error::Domain(format!(
                        "reproduction number at step {step} is {rt} (from {x})"
                    )));
                }
                Ok(rt)
            })
            .collect()
    }

    pub fn simulate_with_scale(
        &self,
        rt_unconstrained: &[f64],
        scale: f64,
    ) -> Result<InfectionTrajectory> {
        let rt = self.reproduction_numbers(rt_unconstrained)?;
        let scale = ensure_positive("initial incidence scale", scale)?;
        let gen_int = self.generation_interval.weights();
        let seed_len = gen_int.len();

        // Exponential growth consistent with the first reproduction number
        let r0 = reproduction_to_growth_rate(rt[0], &self.generation_interval, self.newton_steps)?;
        let dt = self.generation_interval.step();
        let mut infections = Vec::with_capacity(seed_len + rt.len());
        infections.extend(
            (0..seed_len).map(|k| scale * (r0 * (k as f64 - (seed_len - 1) as f64) * dt).exp()),
        );

        for (step, r) in rt.iter().enumerate() {
            let now = infections.len();
            let mut current_infectious = 0.0;
            for (lag, mass) in gen_int.iter().enumerate() {
                current_infectious += infections[now - lag - 1] * mass;
            }
            let incidence = r * current_infectious;
            if !incidence.is_finite() {
                return Err(Error::NumericInstability(format!(
                    "incidence overflowed at step {step}"
                )));
            }
            infections.push(incidence);
        }

        tracing::debug!(
            r0,
            scale,
            seed_len,
            steps = rt.len(),
            "generated latent infections"
        );
        Ok(InfectionTrajectory {
            values: infections,
            seed_len,
        })
    }
}
