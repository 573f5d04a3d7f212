use anyhow::{Result, ensure};
use epiaware::{ModelConfig, RtTransform};
use serde::Deserialize;

fn default_r0() -> f64 {
    2.0
}

fn default_sim_length() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameters {
    pub model: ModelConfig,
    /// Unconstrained reproduction number per step. Overrides `r0`.
    #[serde(default)]
    pub rt: Option<Vec<f64>>,
    /// Constant reproduction number used when `rt` is absent.
    #[serde(default = "default_r0")]
    pub r0: f64,
    #[serde(default = "default_sim_length")]
    pub sim_length: usize,
}

impl Parameters {
    /// Trajectory on the model's unconstrained scale.
    pub fn unconstrained_rt(&self) -> Result<Vec<f64>> {
        if let Some(rt) = &self.rt {
            ensure!(!rt.is_empty(), "rt trajectory is empty");
            return Ok(rt.clone());
        }
        ensure!(self.r0 > 0.0, "r0 must be > 0, got {}", self.r0);
        ensure!(self.sim_length > 0, "sim_length must be > 0");
        let value = match self.model.transformation {
            RtTransform::Exp => self.r0.ln(),
            RtTransform::Identity => self.r0,
            RtTransform::Softplus => self.r0.exp_m1().ln(),
        };
        Ok(vec![value; self.sim_length])
    }
}
