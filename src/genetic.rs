//! Generational genetic algorithm over bounded real vectors.
//!
//! Each generation is rebuilt from three groups:
//! - elites copied unchanged
//! - tournament winners paired up for bounded SBX crossover
//! - randomly sampled individuals that receive Gaussian mutation
//!
//! Only individuals whose fitness was invalidated are re-evaluated, and
//! evaluation runs on the rayon pool.

use std::ops::ControlFlow;

use log::{debug, info};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fitness::{format_fitness_line, FitnessFunction, Individual};
use crate::limits::Limits;
use crate::operators::{gaussian_mutation, sample_without_replacement, sbx_crossover_bounded, select_best, tournament};
use crate::outcome::{GenerationStats, RunOutcome};

/// Contestants per crossover tournament
const TOURNAMENT_SIZE: usize = 2;

/// Configuration for the genetic algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticConfig {
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Share of the population copied unchanged into the next generation
    #[serde(default = "default_elite_fraction")]
    pub elite_fraction: f64,
    /// Share of the population produced by SBX crossover
    #[serde(default = "default_crossover_fraction")]
    pub crossover_fraction: f64,
    /// SBX crowding degree
    #[serde(default = "default_sbx_eta")]
    pub sbx_eta: f64,
    #[serde(default)]
    pub log: bool,
}

fn default_generations() -> usize {
    300
}
fn default_population_size() -> usize {
    20
}
fn default_elite_fraction() -> f64 {
    0.1
}
fn default_crossover_fraction() -> f64 {
    0.4
}
fn default_sbx_eta() -> f64 {
    1.0
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            generations: default_generations(),
            population_size: default_population_size(),
            elite_fraction: default_elite_fraction(),
            crossover_fraction: default_crossover_fraction(),
            sbx_eta: default_sbx_eta(),
            log: false,
        }
    }
}

/// How a population of `population_size` splits into its three groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSizes {
    pub elite: usize,
    /// Always even, so every child has a partner
    pub crossed: usize,
    pub mutated: usize,
}

impl GeneticConfig {
    pub fn group_sizes(&self) -> Result<GroupSizes> {
        if !(0.0..=1.0).contains(&self.elite_fraction) || !(0.0..=1.0).contains(&self.crossover_fraction) {
            return Err(Error::InvalidConfig(format!(
                "fractions must lie in [0, 1] (elite {}, crossover {})",
                self.elite_fraction, self.crossover_fraction
            )));
        }
        if self.elite_fraction + self.crossover_fraction > 1.0 {
            return Err(Error::InvalidConfig(format!(
                "elite_fraction + crossover_fraction = {} exceeds 1",
                self.elite_fraction + self.crossover_fraction
            )));
        }

        let pop = self.population_size as f64;
        let elite = (pop * self.elite_fraction).floor() as usize;
        let mut crossed = (pop * self.crossover_fraction).floor() as usize;
        if crossed % 2 == 1 {
            crossed -= 1;
        }
        let mutated = self
            .population_size
            .checked_sub(elite + crossed)
            .ok_or_else(|| Error::InvalidConfig("group sizes exceed population".to_string()))?;

        Ok(GroupSizes {
            elite,
            crossed,
            mutated,
        })
    }

    pub fn validate(&self) -> Result<GroupSizes> {
        if self.population_size == 0 {
            return Err(Error::InvalidConfig("population_size must be at least 1".to_string()));
        }
        if self.generations == 0 {
            return Err(Error::InvalidConfig("generations must be at least 1".to_string()));
        }
        if !(self.sbx_eta >= 0.0) {
            return Err(Error::InvalidConfig(format!("sbx_eta must be non-negative, got {}", self.sbx_eta)));
        }
        self.group_sizes()
    }
}

/// Evaluate every individual without a valid fitness, in parallel.
/// Returns the number of evaluations performed.
pub fn evaluate_population<F>(population: &mut [Individual], fitness: &F) -> u64
where
    F: FitnessFunction + ?Sized,
{
    population
        .par_iter_mut()
        .filter(|ind| !ind.is_valid())
        .map(|ind| {
            ind.evaluate(fitness);
            1u64
        })
        .sum()
}

/// Build the next generation from an evaluated population
pub fn next_generation<R: Rng + ?Sized>(
    population: &[Individual],
    sizes: GroupSizes,
    limits: &Limits,
    sbx_eta: f64,
    rng: &mut R,
) -> Vec<Individual> {
    let mut next = Vec::with_capacity(population.len());

    // Elitism: keep best individuals
    next.extend(select_best(population, sizes.elite).into_iter().map(|i| population[i].clone()));

    let mut crossed: Vec<Individual> = tournament(population, sizes.crossed, TOURNAMENT_SIZE, rng)
        .into_iter()
        .map(|i| population[i].clone())
        .collect();
    for pair in crossed.chunks_exact_mut(2) {
        let (left, right) = pair.split_at_mut(1);
        sbx_crossover_bounded(&mut left[0].genome, &mut right[0].genome, sbx_eta, limits, rng);
        left[0].invalidate();
        right[0].invalidate();
    }
    next.extend(crossed);

    for i in sample_without_replacement(population.len(), sizes.mutated, rng) {
        let mut mutant = population[i].clone();
        gaussian_mutation(&mut mutant.genome, limits, rng);
        mutant.invalidate();
        next.push(mutant);
    }

    next
}

/// Run the genetic algorithm for up to `config.generations` generations.
///
/// The observer is called with the best fitness of every evaluated
/// generation and may stop the run early. The returned individual is the
/// best of the last evaluated generation.
pub fn genetic<F, O, R>(
    fitness: &F,
    limits: &Limits,
    config: &GeneticConfig,
    mut observer: O,
    rng: &mut R,
) -> Result<RunOutcome>
where
    F: FitnessFunction + ?Sized,
    O: FnMut(f64) -> ControlFlow<()>,
    R: Rng + ?Sized,
{
    let sizes = config.validate()?;
    debug!(
        "GA groups: elite={} crossed={} mutated={}",
        sizes.elite, sizes.crossed, sizes.mutated
    );

    let mut population: Vec<Individual> = (0..config.population_size)
        .map(|_| Individual::new(limits.sample(rng)))
        .collect();

    let mut total_evaluated = 0;
    let mut history = Vec::with_capacity(config.generations);
    let mut best = population[0].clone();
    let mut generations_run = 0;

    for generation in 0..config.generations {
        total_evaluated += evaluate_population(&mut population, fitness);
        generations_run = generation + 1;

        let best_idx = select_best(&population, 1)[0];
        best = population[best_idx].clone();

        let scores: Vec<f64> = population.iter().map(Individual::score).collect();
        history.push(GenerationStats::from_scores(generation, &scores, total_evaluated));

        if config.log {
            info!("Gen {}: best: {}", generation, format_fitness_line(&best));
        }
        if observer(best.score()).is_break() {
            break;
        }

        population = next_generation(&population, sizes, limits, config.sbx_eta, rng);
    }

    Ok(RunOutcome {
        fitness: best.score(),
        best: best.genome,
        generations: generations_run,
        evaluations: total_evaluated,
        restarts: 0,
        history,
    })
}
