//! Renewal-equation epidemic modelling core.
//!
//! Converts between exponential growth rate and reproduction number,
//! generates latent infections from a time-varying reproduction number,
//! builds sparse delay kernels and parameterizes overdispersed count
//! observations. Every operation is a pure function of its inputs; the only
//! randomness is supplied by the caller's RNG.

pub mod error;
pub mod generation;
pub mod kernel;
pub mod model;
pub mod observation;
pub mod pmf;
pub mod renewal;

pub use error::{Error, Result};
pub use generation::{
    DEFAULT_NEWTON_STEPS, GenerationInterval, dneg_mgf, growth_rate_to_reproduction, neg_mgf,
    reproduction_to_growth_rate,
};
pub use kernel::{DelayDistribution, ObservationKernel, build_kernel};
pub use model::{EpiModel, ModelConfig, ModelOutput, PmfSpec};
pub use observation::{
    DEFAULT_POS_SHIFT, DelayObservations, NegativeBinomial, mean_dispersion_negative_binomial,
};
pub use pmf::{DEFAULT_PMF_TOLERANCE, Pmf, discretize_continuous};
pub use renewal::{InfectionTrajectory, InitialisationPrior, RenewalSimulator, RtTransform};
