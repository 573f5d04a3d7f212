//! Declarative model configuration and the end-to-end pipeline.
//!
//! A [`ModelConfig`] is plain data (deserializable from JSON); [`EpiModel`]
//! is the validated model built from it. `EpiModel` wires the renewal
//! simulator to the delayed negative binomial observation model.

use nalgebra::DVector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Gamma, LogNormal};

use crate::{
    error::{Error, Result, ensure_positive},
    generation::{DEFAULT_NEWTON_STEPS, GenerationInterval},
    kernel::{DelayDistribution, ObservationKernel},
    observation::{DEFAULT_POS_SHIFT, DelayObservations, NegativeBinomial, check_pos_shift},
    pmf::DEFAULT_PMF_TOLERANCE,
    renewal::{InfectionTrajectory, InitialisationPrior, RenewalSimulator, RtTransform},
};

/// Source of a discrete lag distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PmfSpec {
    /// Explicit weights.
    Weights(Vec<f64>),
    /// Gamma distribution with `shape` and `rate`, discretized up to `max_delay`.
    Gamma { shape: f64, rate: f64, max_delay: f64 },
    /// Log-normal distribution with log-scale `mu` and `sigma`.
    LogNormal { mu: f64, sigma: f64, max_delay: f64 },
}

fn default_step() -> f64 {
    1.0
}

fn default_pmf_tolerance() -> f64 {
    DEFAULT_PMF_TOLERANCE
}

fn default_newton_steps() -> usize {
    DEFAULT_NEWTON_STEPS
}

fn default_pos_shift() -> f64 {
    DEFAULT_POS_SHIFT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub generation_interval: PmfSpec,
    pub delay: PmfSpec,
    /// Discretization step, in time units.
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_pmf_tolerance")]
    pub pmf_tolerance: f64,
    #[serde(default)]
    pub transformation: RtTransform,
    #[serde(default)]
    pub initialisation_prior: InitialisationPrior,
    #[serde(default = "default_newton_steps")]
    pub newton_steps: usize,
    pub cluster_factor: f64,
    #[serde(default = "default_pos_shift")]
    pub pos_shift: f64,
}

/// Validated model: renewal simulator plus observation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EpiModel {
    simulator: RenewalSimulator,
    delay: DelayDistribution,
    cluster_factor: f64,
    pos_shift: f64,
}

/// Result of one forward simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub infections: InfectionTrajectory,
    /// Transformed reproduction number, one per simulated step.
    pub rt: Vec<f64>,
    /// Expected observed counts, one per simulated step.
    pub expected_cases: Vec<f64>,
    /// Sampled observed counts, one per simulated step.
    pub cases: Vec<u64>,
}

impl EpiModel {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let generation_interval = match &config.generation_interval {
            PmfSpec::Weights(weights) => {
                GenerationInterval::with_step(weights.clone(), config.step, config.pmf_tolerance)?
            }
            PmfSpec::Gamma {
                shape,
                rate,
                max_delay,
            } => GenerationInterval::from_continuous(
                &gamma(*shape, *rate)?,
                config.step,
                *max_delay,
            )?,
            PmfSpec::LogNormal {
                mu,
                sigma,
                max_delay,
            } => GenerationInterval::from_continuous(
                &log_normal(*mu, *sigma)?,
                config.step,
                *max_delay,
            )?,
        };

        let delay = match &config.delay {
            PmfSpec::Weights(weights) => {
                DelayDistribution::with_tolerance(weights.clone(), config.pmf_tolerance)?
            }
            PmfSpec::Gamma {
                shape,
                rate,
                max_delay,
            } => DelayDistribution::from_continuous(&gamma(*shape, *rate)?, config.step, *max_delay)?,
            PmfSpec::LogNormal {
                mu,
                sigma,
                max_delay,
            } => DelayDistribution::from_continuous(
                &log_normal(*mu, *sigma)?,
                config.step,
                *max_delay,
            )?,
        };

        let simulator = RenewalSimulator::new(
            generation_interval,
            config.transformation,
            config.initialisation_prior,
        )
        .with_newton_steps(config.newton_steps);

        // later calls cannot fail on configuration
        config.initialisation_prior.validate()?;
        ensure_positive("clustering factor", config.cluster_factor)?;
        check_pos_shift(config.pos_shift)?;

        tracing::debug!(
            gen_int_len = simulator.generation_interval().len(),
            delay_len = delay.len(),
            transform = ?config.transformation,
            "built model"
        );
        Ok(Self {
            simulator,
            delay,
            cluster_factor: config.cluster_factor,
            pos_shift: config.pos_shift,
        })
    }

    pub fn simulator(&self) -> &RenewalSimulator {
        &self.simulator
    }

    pub fn delay(&self) -> &DelayDistribution {
        &self.delay
    }

    /// Observation model over the full trajectory, seeding window included.
    pub fn observation_model(&self, trajectory: &InfectionTrajectory) -> Result<DelayObservations> {
        let kernel = ObservationKernel::from_delay(&self.delay, trajectory.len())?;
        DelayObservations::new(kernel, self.cluster_factor)?.with_pos_shift(self.pos_shift)
    }

    /// Expected observed counts for the simulated steps. Seeded infections
    /// contribute to early observations through the delay.
    pub fn expected_observations(&self, trajectory: &InfectionTrajectory) -> Result<Vec<f64>> {
        let expected = self
            .observation_model(trajectory)?
            .expected_observations(trajectory.values())?;
        Ok(simulated_part(&expected, trajectory.seed_len()))
    }

    /// Count distributions for the simulated steps.
    pub fn observation_distributions(
        &self,
        trajectory: &InfectionTrajectory,
    ) -> Result<Vec<NegativeBinomial>> {
        let mut dists = self
            .observation_model(trajectory)?
            .distributions(trajectory.values())?;
        Ok(dists.split_off(trajectory.seed_len()))
    }

    /// Log likelihood of `observed` (one entry per simulated step, `None` for
    /// missing) given an unconstrained Rt trajectory and seeding scale.
    pub fn log_likelihood(
        &self,
        rt_unconstrained: &[f64],
        scale: f64,
        observed: &[Option<u64>],
    ) -> Result<f64> {
        if observed.len() != rt_unconstrained.len() {
            return Err(Error::Domain(format!(
                "{} observations for {} simulated steps",
                observed.len(),
                rt_unconstrained.len()
            )));
        }
        let trajectory = self.simulator.simulate_with_scale(rt_unconstrained, scale)?;
        let padded: Vec<Option<u64>> = std::iter::repeat_n(None, trajectory.seed_len())
            .chain(observed.iter().copied())
            .collect();
        self.observation_model(&trajectory)?
            .log_likelihood(trajectory.values(), &padded)
    }

    /// Forward simulation: latent infections, expected and sampled counts.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rt_unconstrained: &[f64],
        rng: &mut R,
    ) -> Result<ModelOutput> {
        let rt = self.simulator.reproduction_numbers(rt_unconstrained)?;
        let infections = self.simulator.simulate(rt_unconstrained, rng)?;
        let observations = self.observation_model(&infections)?;
        let expected = observations.expected_observations(infections.values())?;
        let mut cases = observations.simulate(infections.values(), rng)?;

        Ok(ModelOutput {
            expected_cases: simulated_part(&expected, infections.seed_len()),
            cases: cases.split_off(infections.seed_len()),
            rt,
            infections,
        })
    }
}

fn simulated_part(values: &DVector<f64>, seed_len: usize) -> Vec<f64> {
    values.iter().skip(seed_len).copied().collect()
}

fn gamma(shape: f64, rate: f64) -> Result<Gamma> {
    Gamma::new(shape, rate)
        .map_err(|e| Error::InvalidDistribution(format!("gamma ({shape}, {rate}): {e}")))
}

fn log_normal(mu: f64, sigma: f64) -> Result<LogNormal> {
    LogNormal::new(mu, sigma)
        .map_err(|e| Error::InvalidDistribution(format!("log-normal ({mu}, {sigma}): {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{SeedableRng, rngs::StdRng};

    fn config() -> ModelConfig {
        serde_json::from_str(
            r#"{
                "generation_interval": {"weights": [0.2, 0.5, 0.3]},
                "delay": {"weights": [0.5, 0.5]},
                "initialisation_prior": {"fixed": 10.0},
                "cluster_factor": 0.1
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = config();
        assert_eq!(config.step, 1.0);
        assert_eq!(config.newton_steps, DEFAULT_NEWTON_STEPS);
        assert_eq!(config.transformation, RtTransform::Exp);
        assert_eq!(config.pos_shift, DEFAULT_POS_SHIFT);
        assert_eq!(config.pmf_tolerance, DEFAULT_PMF_TOLERANCE);
    }

    #[test]
    fn test_continuous_specs() {
        let mut config = config();
        config.generation_interval = PmfSpec::Gamma {
            shape: 6.5,
            rate: 1.0 / 0.62,
            max_delay: 20.0,
        };
        config.delay = PmfSpec::LogNormal {
            mu: 1.0,
            sigma: 0.5,
            max_delay: 15.0,
        };
        let model = EpiModel::from_config(&config).unwrap();
        assert_eq!(model.simulator().generation_interval().len(), 19);
        assert_eq!(model.delay().len(), 15);
    }

    #[test]
    fn test_invalid_config() {
        let mut bad_gi = config();
        bad_gi.generation_interval = PmfSpec::Weights(vec![0.5, 0.5, 0.5]);
        assert!(matches!(
            EpiModel::from_config(&bad_gi),
            Err(Error::InvalidDistribution(_))
        ));

        let mut bad_cluster = config();
        bad_cluster.cluster_factor = 0.0;
        assert!(matches!(
            EpiModel::from_config(&bad_cluster),
            Err(Error::Domain(_))
        ));

        let mut bad_shift = config();
        bad_shift.pos_shift = -1.0;
        assert!(matches!(
            EpiModel::from_config(&bad_shift),
            Err(Error::Domain(_))
        ));

        let mut bad_prior = config();
        bad_prior.initialisation_prior = InitialisationPrior::LogNormal {
            mu: 0.0,
            sigma: -1.0,
        };
        assert!(matches!(
            EpiModel::from_config(&bad_prior),
            Err(Error::Domain(_))
        ));

        let mut bad_gamma = config();
        bad_gamma.delay = PmfSpec::Gamma {
            shape: -1.0,
            rate: 1.0,
            max_delay: 10.0,
        };
        assert!(matches!(
            EpiModel::from_config(&bad_gamma),
            Err(Error::InvalidDistribution(_))
        ));
    }

    #[test]
    fn test_generate_lengths() {
        let model = EpiModel::from_config(&config()).unwrap();
        let log_rt = vec![0.1; 25];
        let out = model
            .generate(&log_rt, &mut StdRng::seed_from_u64(8675309))
            .unwrap();
        assert_eq!(out.infections.len(), 3 + 25);
        assert_eq!(out.rt.len(), 25);
        assert_eq!(out.expected_cases.len(), 25);
        assert_eq!(out.cases.len(), 25);
        assert_relative_eq!(out.rt[0], 0.1_f64.exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_expected_observations_use_seeding() {
        let model = EpiModel::from_config(&config()).unwrap();
        let trajectory = model.simulator().simulate_with_scale(&[0.0; 4], 10.0).unwrap();
        let expected = model.expected_observations(&trajectory).unwrap();
        // stationary at R = 1, and the first step sees half of the last seed
        for value in expected {
            assert_relative_eq!(value, 10.0 + DEFAULT_POS_SHIFT, epsilon = 1e-6);
        }
        assert_eq!(model.observation_distributions(&trajectory).unwrap().len(), 4);
    }

    #[test]
    fn test_log_likelihood() {
        let model = EpiModel::from_config(&config()).unwrap();
        let rt = [0.0; 3];
        let trajectory = model.simulator().simulate_with_scale(&rt, 10.0).unwrap();
        let dists = model.observation_distributions(&trajectory).unwrap();
        let observed = [Some(9), None, Some(12)];
        let ll = model.log_likelihood(&rt, 10.0, &observed).unwrap();
        assert_relative_eq!(ll, dists[0].ln_pmf(9) + dists[2].ln_pmf(12), epsilon = 1e-12);
        assert!(model.log_likelihood(&rt, 10.0, &[Some(1)]).is_err());
    }
}
