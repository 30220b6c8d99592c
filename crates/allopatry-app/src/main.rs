//! Headless runner for barrier-driven speciation experiments.

mod config;
mod experiment;

use crate::config::AppConfig;
use crate::experiment::{Experiment, LogReporter};
use allopatry_core::World;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "allopatry",
    about = "Run an allopatric speciation experiment on a grid world"
)]
struct Args {
    /// Path to a YAML configuration file; defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the RNG seed from the configuration.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the experiment tick budget.
    #[arg(long)]
    max_steps: Option<u64>,

    /// Print the final outcome as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.world.rng_seed = Some(seed);
    }
    if let Some(max_steps) = args.max_steps {
        config.experiment.max_steps = max_steps;
    }
    config.validate()?;

    info!(
        width = config.world.width,
        height = config.world.height,
        seed = ?config.world.rng_seed,
        burn_in = config.experiment.burn_in_steps,
        max_steps = config.experiment.max_steps,
        "starting experiment"
    );

    let mut world = World::with_reporter(config.world.clone(), Box::new(LogReporter))
        .context("constructing world")?;
    let experiment = Experiment::new(config.experiment.clone());
    let outcome = experiment.run(&mut world).context("running experiment")?;

    info!(outcome = ?outcome, "experiment finished");
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("serializing outcome")?;
        println!("{rendered}");
    }
    Ok(())
}
