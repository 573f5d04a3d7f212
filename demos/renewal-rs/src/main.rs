pub mod environment;
pub mod output;
pub mod parameters;

use anyhow::{Context, Result};
use epiaware::EpiModel;
use rand::{SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

use environment::Environment;
use output::RenewalOutput;
use parameters::Parameters;

fn main() -> Result<()> {
    // stdout may carry the CSV, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Environment::<Parameters>::from_stdin()?;
    let parameters = ctx.parameters();

    let model = EpiModel::from_config(&parameters.model).context("invalid model configuration")?;
    let rt = parameters.unconstrained_rt()?;
    tracing::info!(
        seed = ctx.input.seed,
        replicate = ctx.input.replicate,
        steps = rt.len(),
        "running renewal model"
    );

    // Run simulation
    let mut rng = StdRng::seed_from_u64(ctx.input.seed);
    let result = model
        .generate(&rt, &mut rng)
        .context("simulation failed")?;
    tracing::info!(
        total_infections = result.infections.simulated().iter().sum::<f64>(),
        total_cases = result.cases.iter().sum::<u64>(),
        "simulation complete"
    );

    let output = RenewalOutput::from_model(&result);
    ctx.write_csv(
        "renewal_output.csv",
        &RenewalOutput::HEADERS,
        &output.rows(ctx.input.replicate),
    )
}
