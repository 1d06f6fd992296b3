//! (1+1) evolution strategy with plateau termination and restarts.
//!
//! A single parent is mutated into one applicant per generation; the
//! applicant replaces the parent only on strict improvement. A run ends
//! once `max_plateau` applicants have been rejected, and the restart
//! wrapper keeps launching fresh runs until the observer stops it.

use std::ops::ControlFlow;

use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fitness::{format_fitness_line, is_better, FitnessFunction, Individual};
use crate::limits::Limits;
use crate::operators::gaussian_mutation;
use crate::outcome::RunOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnePlusOneConfig {
    /// Rejected applicants allowed before a run ends
    #[serde(default = "default_max_plateau")]
    pub max_plateau: usize,
    /// Upper bound on restarts; `None` restarts until the observer stops
    #[serde(default)]
    pub max_restarts: Option<usize>,
    #[serde(default)]
    pub log: bool,
}

fn default_max_plateau() -> usize {
    100
}

impl Default for OnePlusOneConfig {
    fn default() -> Self {
        Self {
            max_plateau: default_max_plateau(),
            max_restarts: None,
            log: false,
        }
    }
}

impl OnePlusOneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_plateau == 0 {
            return Err(Error::InvalidConfig("max_plateau must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a single run, plus whether the observer asked to stop
struct SingleRun {
    outcome: RunOutcome,
    stopped: bool,
}

/// One hill-climbing run from a random starting point.
///
/// The observer sees the parent's fitness once per generation, before the
/// plateau check, and can end the run with `ControlFlow::Break`.
pub fn one_plus_one_once<F, O, R>(
    fitness: &F,
    limits: &Limits,
    config: &OnePlusOneConfig,
    observer: &mut O,
    rng: &mut R,
) -> Result<RunOutcome>
where
    F: FitnessFunction + ?Sized,
    O: FnMut(f64) -> ControlFlow<()>,
    R: Rng + ?Sized,
{
    config.validate()?;
    Ok(run_once(fitness, limits, config, observer, rng).outcome)
}

fn run_once<F, O, R>(
    fitness: &F,
    limits: &Limits,
    config: &OnePlusOneConfig,
    observer: &mut O,
    rng: &mut R,
) -> SingleRun
where
    F: FitnessFunction + ?Sized,
    O: FnMut(f64) -> ControlFlow<()>,
    R: Rng + ?Sized,
{
    let mut best = Individual::new(limits.sample(rng));
    best.evaluate(fitness);
    let mut evaluations: u64 = 1;

    let mut time_on_plateau = 0;
    let mut generation = 0;
    let mut stopped = false;

    loop {
        let mut applicant = best.clone();
        gaussian_mutation(&mut applicant.genome, limits, rng);
        applicant.invalidate();
        applicant.evaluate(fitness);
        evaluations += 1;

        let improved = is_better(applicant.score(), best.score());

        if config.log {
            info!("Gen {}: best: {}", generation, format_fitness_line(&best));
            info!("  applicant: {}", format_fitness_line(&applicant));
        }
        if observer(best.score()).is_break() {
            stopped = true;
            break;
        }

        if !improved {
            time_on_plateau += 1;
            if time_on_plateau == config.max_plateau {
                break;
            }
        } else {
            best = applicant;
        }
        generation += 1;
    }

    SingleRun {
        outcome: RunOutcome {
            fitness: best.score(),
            best: best.genome,
            generations: generation,
            evaluations,
            restarts: 0,
            history: Vec::new(),
        },
        stopped,
    }
}

/// Restart `one_plus_one_once` until the observer stops (or the restart
/// cap is hit) and return the best run.
pub fn one_plus_one<F, O, R>(
    fitness: &F,
    limits: &Limits,
    config: &OnePlusOneConfig,
    mut observer: O,
    rng: &mut R,
) -> Result<RunOutcome>
where
    F: FitnessFunction + ?Sized,
    O: FnMut(f64) -> ControlFlow<()>,
    R: Rng + ?Sized,
{
    config.validate()?;

    let mut kept: Option<RunOutcome> = None;
    let mut generations = 0;
    let mut evaluations = 0;
    let mut runs = 0;

    loop {
        let run = run_once(fitness, limits, config, &mut observer, rng);
        runs += 1;
        generations += run.outcome.generations;
        evaluations += run.outcome.evaluations;

        let replace = match &kept {
            None => true,
            Some(prev) => is_better(run.outcome.fitness, prev.fitness),
        };
        if replace {
            info!(
                "Restart {}: new best fitness {:.6} after {} generations",
                runs, run.outcome.fitness, run.outcome.generations
            );
            kept = Some(run.outcome);
        }

        if run.stopped {
            break;
        }
        if let Some(max) = config.max_restarts {
            if runs > max {
                break;
            }
        }
    }

    // The loop body runs at least once
    let mut outcome = kept.ok_or_else(|| Error::InvalidConfig("no runs completed".to_string()))?;
    outcome.generations = generations;
    outcome.evaluations = evaluations;
    outcome.restarts = runs - 1;
    Ok(outcome)
}
