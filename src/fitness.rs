//! Fitness plumbing shared by every optimizer.
//!
//! All optimizers here maximize. A NaN fitness (the scattering solver
//! returns one when its series fails to converge) ranks below every
//! number, so it can never displace a valid individual.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Objective evaluated on a real-valued genome. Higher is better.
pub trait FitnessFunction: Sync {
    fn evaluate(&self, genome: &[f64]) -> f64;
}

impl<F> FitnessFunction for F
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn evaluate(&self, genome: &[f64]) -> f64 {
        self(genome)
    }
}

/// Order two fitness values with NaN as the worst possible value
pub fn compare_fitness(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Strict improvement: ties and NaN never win
pub fn is_better(candidate: f64, incumbent: f64) -> bool {
    compare_fitness(candidate, incumbent) == Ordering::Greater
}

/// A genome together with its (possibly stale) fitness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub genome: Vec<f64>,
    /// `None` until evaluated, and again after any variation
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(genome: Vec<f64>) -> Self {
        Self {
            genome,
            fitness: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    /// Fitness for ranking; unevaluated individuals rank as NaN
    pub fn score(&self) -> f64 {
        self.fitness.unwrap_or(f64::NAN)
    }

    pub fn evaluate<F: FitnessFunction + ?Sized>(&mut self, fitness: &F) -> f64 {
        let value = fitness.evaluate(&self.genome);
        self.fitness = Some(value);
        value
    }
}

/// Compact single-line summary
pub fn format_fitness_line(ind: &Individual) -> String {
    let genes: Vec<String> = ind.genome.iter().map(|g| format!("{:.4}", g)).collect();
    format!("fit={:.6} [{}]", ind.score(), genes.join(", "))
}
