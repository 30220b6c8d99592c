//! Barrier experiment driver: burn in, raise the barrier, then poll
//! the speciation tester until isolation, extinction, or budget
//! exhaustion.

use crate::config::ExperimentConfig;
use allopatry_core::{BatchReport, Reporter, SpeciationReport, World, WorldError};
use serde::Serialize;
use tracing::{info, warn};

/// Terminal state of one experiment run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExperimentOutcome {
    /// The sub-populations became reproductively isolated.
    Speciated {
        steps: u64,
        report: SpeciationReport,
    },
    /// Every agent died before the test could conclude.
    Extinct { steps: u64 },
    /// The tick budget ran out with interbreeding still above the
    /// isolation threshold.
    BudgetExhausted {
        steps: u64,
        last_report: SpeciationReport,
    },
}

/// Runs the configured schedule against a world.
#[derive(Debug, Clone)]
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    #[must_use]
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Drive the world to a terminal outcome.
    pub fn run(&self, world: &mut World) -> Result<ExperimentOutcome, WorldError> {
        let burn_in = self.config.burn_in_steps;
        info!(steps = burn_in, "starting burn-in");
        world.run(burn_in);
        let mut steps = burn_in;
        if world.is_extinct() {
            warn!(steps, "population went extinct during burn-in");
            return Ok(ExperimentOutcome::Extinct { steps });
        }

        let barrier = world.place_barrier()?;
        info!(
            orientation = %barrier.orientation,
            index = barrier.index,
            "barrier placed"
        );

        let mut last_report = world.check_speciation()?;
        loop {
            if last_report.speciated {
                info!(
                    steps,
                    fraction = last_report.interbreed_fraction,
                    "populations are reproductively isolated"
                );
                return Ok(ExperimentOutcome::Speciated {
                    steps,
                    report: last_report,
                });
            }
            if steps >= self.config.max_steps {
                info!(steps, "tick budget exhausted");
                return Ok(ExperimentOutcome::BudgetExhausted { steps, last_report });
            }

            world.run(self.config.check_interval);
            steps += self.config.check_interval;
            if world.is_extinct() {
                warn!(steps, "population went extinct behind the barrier");
                return Ok(ExperimentOutcome::Extinct { steps });
            }
            last_report = world.check_speciation()?;
            info!(
                steps,
                population = world.population(),
                fraction = last_report.interbreed_fraction,
                compatible_pairs = last_report.compatible_pairs,
                "speciation check"
            );
        }
    }
}

/// Reporter that forwards batch statistics to the log.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_batch(&mut self, report: &BatchReport) {
        info!(
            tick = report.tick.0,
            population = report.population,
            births = report.births,
            deaths = report.deaths,
            total_energy = report.total_energy,
            "tick batch complete"
        );
    }

    fn on_extinction(&mut self, report: &BatchReport) {
        warn!(tick = report.tick.0, "population extinct");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allopatry_core::WorldConfig;

    #[test]
    fn starving_world_reports_extinction() {
        let world_config = WorldConfig {
            width: 8,
            height: 8,
            rng_seed: Some(3),
            initial_energy: 2.0,
            food_density: 0.0,
            food_spawn_probability: 0.0,
            ..WorldConfig::default()
        };
        let mut world = World::new(world_config).expect("world");
        let experiment = Experiment::new(ExperimentConfig {
            burn_in_steps: 5,
            check_interval: 5,
            max_steps: 50,
        });
        let outcome = experiment.run(&mut world).expect("outcome");
        assert!(matches!(outcome, ExperimentOutcome::Extinct { steps: 5 }));
    }

    #[test]
    fn experiment_terminates_within_budget() {
        let world_config = WorldConfig {
            width: 10,
            height: 10,
            rng_seed: Some(12),
            ..WorldConfig::default()
        };
        let mut world = World::new(world_config).expect("world");
        let experiment = Experiment::new(ExperimentConfig {
            burn_in_steps: 20,
            check_interval: 10,
            max_steps: 120,
        });
        let outcome = experiment.run(&mut world).expect("outcome");
        match outcome {
            ExperimentOutcome::Speciated { steps, .. }
            | ExperimentOutcome::Extinct { steps } => assert!(steps <= 120 + 10),
            ExperimentOutcome::BudgetExhausted { steps, .. } => assert!(steps >= 120),
        }
    }
}
