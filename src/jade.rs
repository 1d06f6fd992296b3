//! JADE: adaptive differential evolution with an external archive.
//!
//! Mutation is current-to-p-best/1. The second difference vector may come
//! from an archive of recently replaced parents. The per-individual scale
//! factor F and crossover rate CR are drawn around `mu_f` and `mu_cr`,
//! which adapt toward the values that produced successful trials. With
//! `pmcrade` enabled, `mu_cr` follows the power mean of the successful
//! rates whenever their spread is large.
//!
//! Like the other optimizers in this crate, JADE maximizes.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Cauchy, Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fitness::{compare_fitness, is_better, FitnessFunction};
use crate::limits::Limits;
use crate::outcome::{GenerationStats, RunOutcome};

/// Standard deviation of the F and CR sampling distributions
const PARAMETER_SPREAD: f64 = 0.1;
/// Successful-CR spread above which PMCRADE switches to the power mean
const PMCRADE_THRESHOLD: f64 = 0.07;
/// Redraws of a non-positive F before falling back to `F_FALLBACK`
const MAX_F_REDRAWS: usize = 10;
const F_FALLBACK: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JadeConfig {
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Share of the population eligible as the p-best donor
    #[serde(default = "default_best_share_p")]
    pub best_share_p: f64,
    /// Learning rate of the `mu_f` / `mu_cr` adaptation
    #[serde(default = "default_adaptation_c")]
    pub adaptation_c: f64,
    #[serde(default = "default_pmcrade")]
    pub pmcrade: bool,
}

fn default_population_size() -> usize {
    75
}
fn default_best_share_p() -> f64 {
    0.05
}
fn default_adaptation_c() -> f64 {
    0.1
}
fn default_pmcrade() -> bool {
    true
}

impl Default for JadeConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            best_share_p: default_best_share_p(),
            adaptation_c: default_adaptation_c(),
            pmcrade: default_pmcrade(),
        }
    }
}

impl JadeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 3 {
            return Err(Error::InvalidConfig(format!(
                "JADE needs at least 3 individuals, got {}",
                self.population_size
            )));
        }
        if !(0.0..=1.0).contains(&self.best_share_p) {
            return Err(Error::InvalidConfig(format!("best_share_p {} outside [0, 1]", self.best_share_p)));
        }
        if (self.population_size as f64 * self.best_share_p).floor() as usize >= self.population_size {
            return Err(Error::InvalidConfig("best_share_p leaves no room outside the p-best set".to_string()));
        }
        if !(0.0..=1.0).contains(&self.adaptation_c) {
            return Err(Error::InvalidConfig(format!("adaptation_c {} outside [0, 1]", self.adaptation_c)));
        }
        Ok(())
    }
}

/// A running JADE optimization
pub struct Jade<'a, F: FitnessFunction + ?Sized> {
    fitness: &'a F,
    limits: Limits,
    config: JadeConfig,
    population: Vec<Vec<f64>>,
    scores: Vec<f64>,
    /// Population indices sorted best first
    ranking: Vec<usize>,
    archive: Vec<Vec<f64>>,
    mu_f: f64,
    mu_cr: f64,
    pub generation: usize,
    pub total_evaluated: u64,
    pub history: Vec<GenerationStats>,
    rng: StdRng,
}

impl<'a, F: FitnessFunction + ?Sized> Jade<'a, F> {
    /// Create and evaluate an initial population.
    ///
    /// `feed` vectors replace the last random individuals, so known good
    /// designs can seed the search.
    pub fn new(fitness: &'a F, limits: Limits, config: JadeConfig, feed: Vec<Vec<f64>>, mut rng: StdRng) -> Result<Self> {
        config.validate()?;
        if feed.len() >= config.population_size {
            return Err(Error::InvalidConfig(format!(
                "feed of {} vectors leaves no random individuals in a population of {}",
                feed.len(),
                config.population_size
            )));
        }
        for x in &feed {
            if x.len() != limits.dim() {
                return Err(Error::GenomeLength {
                    expected: limits.dim(),
                    actual: x.len(),
                });
            }
            if !limits.contains(x) {
                return Err(Error::InvalidLimits(format!("feed vector {:?} lies outside the limits", x)));
            }
        }

        let mut population: Vec<Vec<f64>> = (0..config.population_size - feed.len())
            .map(|_| limits.sample(&mut rng))
            .collect();
        population.extend(feed);

        let scores = evaluate_all(fitness, &population);
        let mut jade = Self {
            fitness,
            limits,
            total_evaluated: population.len() as u64,
            ranking: Vec::new(),
            population,
            scores,
            archive: Vec::new(),
            mu_f: 0.5,
            mu_cr: 0.5,
            generation: 0,
            history: Vec::new(),
            config,
            rng,
        };
        jade.rank();
        jade.history
            .push(GenerationStats::from_scores(0, &jade.scores, jade.total_evaluated));
        Ok(jade)
    }

    fn rank(&mut self) {
        let scores = &self.scores;
        let mut ranking: Vec<usize> = (0..scores.len()).collect();
        ranking.sort_by(|&a, &b| compare_fitness(scores[b], scores[a]));
        self.ranking = ranking;
    }

    /// Current best vector and fitness
    pub fn best(&self) -> (&[f64], f64) {
        let idx = self.ranking[0];
        (self.population[idx].as_slice(), self.scores[idx])
    }

    pub fn mu_f(&self) -> f64 {
        self.mu_f
    }

    pub fn mu_cr(&self) -> f64 {
        self.mu_cr
    }

    pub fn archive_len(&self) -> usize {
        self.archive.len()
    }

    /// Advance `generations` generations and return the best fitness
    pub fn run(&mut self, generations: usize) -> f64 {
        for _ in 0..generations {
            self.step();
        }
        self.best().1
    }

    /// One JADE generation
    pub fn step(&mut self) {
        let n = self.population.len();

        let mut f_values = Vec::with_capacity(n);
        let mut cr_values = Vec::with_capacity(n);
        let mut trials = Vec::with_capacity(n);
        for i in 0..n {
            let f_i = self.sample_f();
            let cr_i = self.sample_cr();
            let mutant = self.mutation(i, f_i);
            trials.push(self.crossover(&mutant, i, cr_i));
            f_values.push(f_i);
            cr_values.push(cr_i);
        }

        // Trials depend only on the current generation, so they can be
        // scored together before selection
        let trial_scores = evaluate_all(self.fitness, &trials);
        self.total_evaluated += n as u64;

        let f_best = self.best().1;
        let mut successful_f = Vec::new();
        let mut successful_cr = Vec::new();
        let mut replaced = Vec::new();
        for (i, (trial, f_trial)) in trials.into_iter().zip(trial_scores).enumerate() {
            let success = is_better(f_trial, self.scores[i]) || f_trial == f_best;
            if success {
                let parent = std::mem::replace(&mut self.population[i], trial);
                replaced.push(parent);
                self.scores[i] = f_trial;
                successful_f.push(f_values[i]);
                successful_cr.push(cr_values[i]);
            }
        }

        self.archive.extend(replaced);
        self.trim_archive();
        self.adapt(&successful_f, &successful_cr);
        self.rank();

        self.generation += 1;
        self.history.push(GenerationStats::from_scores(
            self.generation,
            &self.scores,
            self.total_evaluated,
        ));
        if self.generation % 100 == 0 {
            info!(
                "JADE gen {}: best {:.6} mu_F {:.3} mu_CR {:.3} archive {}",
                self.generation,
                self.best().1,
                self.mu_f,
                self.mu_cr,
                self.archive.len()
            );
        }
    }

    fn sample_f(&mut self) -> f64 {
        let cauchy = match Cauchy::new(self.mu_f, PARAMETER_SPREAD) {
            Ok(c) => c,
            Err(_) => return F_FALLBACK,
        };
        for _ in 0..=MAX_F_REDRAWS {
            let f = cauchy.sample(&mut self.rng);
            if f > 1.0 {
                return 1.0;
            }
            if f > 0.0 {
                return f;
            }
        }
        F_FALLBACK
    }

    fn sample_cr(&mut self) -> f64 {
        match Normal::new(self.mu_cr, PARAMETER_SPREAD) {
            Ok(normal) => normal.sample(&mut self.rng).clamp(0.0, 1.0),
            Err(_) => self.mu_cr.clamp(0.0, 1.0),
        }
    }

    fn mutation(&mut self, i: usize, f_i: f64) -> Vec<f64> {
        let n = self.population.len();

        let n_best = (n as f64 * self.config.best_share_p).floor() as usize;
        let p_best = self.ranking[self.rng.gen_range(0..=n_best)];

        let mut r1 = self.rng.gen_range(0..n);
        while r1 == i {
            r1 = self.rng.gen_range(0..n);
        }

        let union = n + self.archive.len();
        let mut r2 = self.rng.gen_range(0..union);
        while r2 == r1 || r2 == i {
            r2 = self.rng.gen_range(0..union);
        }
        let x_r2 = if r2 < n {
            &self.population[r2]
        } else {
            &self.archive[r2 - n]
        };

        let x = &self.population[i];
        let x_best = &self.population[p_best];
        let x_r1 = &self.population[r1];

        (0..x.len())
            .map(|c| {
                let v = x[c] + f_i * (x_best[c] - x[c]) + f_i * (x_r1[c] - x_r2[c]);
                let (lo, hi) = (self.limits.lower(c), self.limits.upper(c));
                // Bounce halfway back from the violated bound
                if v > hi {
                    (hi + x[c]) / 2.0
                } else if v < lo {
                    (lo + x[c]) / 2.0
                } else {
                    v
                }
            })
            .collect()
    }

    fn crossover(&mut self, mutant: &[f64], i: usize, cr_i: f64) -> Vec<f64> {
        let x = &self.population[i];
        let j_rand = self.rng.gen_range(0..x.len());
        (0..x.len())
            .map(|c| {
                if c == j_rand || self.rng.gen::<f64>() < cr_i {
                    mutant[c]
                } else {
                    x[c]
                }
            })
            .collect()
    }

    fn trim_archive(&mut self) {
        while self.archive.len() > self.population.len() {
            let idx = self.rng.gen_range(0..self.archive.len());
            self.archive.swap_remove(idx);
        }
    }

    fn adapt(&mut self, successful_f: &[f64], successful_cr: &[f64]) {
        if successful_cr.is_empty() || successful_f.is_empty() {
            return;
        }
        let c = self.config.adaptation_c;
        let count = successful_cr.len() as f64;
        let mean_cr = successful_cr.iter().sum::<f64>() / count;

        let target_cr = if self.config.pmcrade {
            let spread = (successful_cr.iter().map(|cr| (cr - mean_cr).powi(2)).sum::<f64>() / count).sqrt();
            if spread < PMCRADE_THRESHOLD {
                mean_cr
            } else {
                (successful_cr.iter().map(|cr| cr * cr).sum::<f64>() / count).sqrt()
            }
        } else {
            mean_cr
        };
        self.mu_cr = (1.0 - c) * self.mu_cr + c * target_cr;

        // Lehmer mean favours larger successful scale factors
        let sum_f: f64 = successful_f.iter().sum();
        let sum_f2: f64 = successful_f.iter().map(|f| f * f).sum();
        if sum_f > 0.0 {
            self.mu_f = (1.0 - c) * self.mu_f + c * (sum_f2 / sum_f);
        }
        debug!("JADE adapt: mu_F={:.4} mu_CR={:.4}", self.mu_f, self.mu_cr);
    }

    /// Snapshot of the run as an outcome
    pub fn outcome(&self) -> RunOutcome {
        let (best, fitness) = self.best();
        RunOutcome {
            best: best.to_vec(),
            fitness,
            generations: self.generation,
            evaluations: self.total_evaluated,
            restarts: 0,
            history: self.history.clone(),
        }
    }
}

fn evaluate_all<F: FitnessFunction + ?Sized>(fitness: &F, vectors: &[Vec<f64>]) -> Vec<f64> {
    vectors.par_iter().map(|x| fitness.evaluate(x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn neg_rastrigin(x: &[f64]) -> f64 {
        -x.iter()
            .map(|v| v * v - 10.0 * (2.0 * std::f64::consts::PI * v).cos() + 10.0)
            .sum::<f64>()
    }

    fn neg_sphere(x: &[f64]) -> f64 {
        -x.iter().map(|v| v * v).sum::<f64>()
    }

    #[test]
    fn test_config_validation() {
        assert!(JadeConfig::default().validate().is_ok());
        let tiny = JadeConfig {
            population_size: 2,
            ..Default::default()
        };
        assert!(tiny.validate().is_err());
        let greedy = JadeConfig {
            population_size: 10,
            best_share_p: 1.0,
            ..Default::default()
        };
        assert!(greedy.validate().is_err());
    }

    #[test]
    fn test_jade_solves_sphere() {
        let limits = Limits::uniform(5, -100.0, 100.0).unwrap();
        let config = JadeConfig {
            population_size: 30,
            ..Default::default()
        };
        let mut jade = Jade::new(&neg_sphere, limits.clone(), config, Vec::new(), StdRng::seed_from_u64(42)).unwrap();
        let best = jade.run(300);

        assert!(best > -1e-3, "JADE stalled at {}", best);
        assert!(limits.contains(jade.best().0));
        assert_eq!(jade.generation, 300);
        assert_eq!(jade.total_evaluated, 30 * 301);
    }

    #[test]
    fn test_best_never_gets_worse() {
        let limits = Limits::uniform(4, -5.12, 5.12).unwrap();
        let config = JadeConfig {
            population_size: 20,
            pmcrade: false,
            ..Default::default()
        };
        let mut jade = Jade::new(&neg_rastrigin, limits, config, Vec::new(), StdRng::seed_from_u64(7)).unwrap();
        let mut previous = jade.best().1;
        for _ in 0..50 {
            let current = jade.run(2);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_archive_bounded_by_population() {
        let limits = Limits::uniform(3, -1.0, 1.0).unwrap();
        let config = JadeConfig {
            population_size: 8,
            ..Default::default()
        };
        let mut jade = Jade::new(&neg_sphere, limits, config, Vec::new(), StdRng::seed_from_u64(3)).unwrap();
        for _ in 0..40 {
            jade.step();
            assert!(jade.archive_len() <= 8);
            assert!(jade.mu_cr() >= 0.0 && jade.mu_cr() <= 1.0);
            assert!(jade.mu_f() > 0.0);
        }
    }

    #[test]
    fn test_history_indexed_by_generation() {
        let limits = Limits::uniform(2, -1.0, 1.0).unwrap();
        let config = JadeConfig {
            population_size: 6,
            ..Default::default()
        };
        let mut jade = Jade::new(&neg_sphere, limits, config, Vec::new(), StdRng::seed_from_u64(11)).unwrap();
        jade.run(4);
        assert_eq!(jade.history.len(), 5);
        for (i, stats) in jade.history.iter().enumerate() {
            assert_eq!(stats.generation, i);
            assert_eq!(stats.total_evaluated, 6 * (i as u64 + 1));
        }
    }

    #[test]
    fn test_cr_adaptation_switches_to_power_mean() {
        let limits = Limits::uniform(2, -1.0, 1.0).unwrap();
        let config = JadeConfig {
            population_size: 6,
            ..Default::default()
        };
        let mut jade = Jade::new(&neg_sphere, limits, config, Vec::new(), StdRng::seed_from_u64(1)).unwrap();

        // identical CRs: spread 0, arithmetic mean
        jade.mu_cr = 0.2;
        jade.adapt(&[0.5, 0.5], &[0.5, 0.5]);
        assert!((jade.mu_cr() - 0.23).abs() < 1e-12);

        // spread 0.4: quadratic mean sqrt((0.01 + 0.81) / 2)
        jade.mu_cr = 0.2;
        jade.adapt(&[0.5, 0.5], &[0.1, 0.9]);
        let expected = 0.9 * 0.2 + 0.1 * 0.41f64.sqrt();
        assert!((jade.mu_cr() - expected).abs() < 1e-12);

        // spread 0.05 stays below the switch
        jade.mu_cr = 0.2;
        jade.adapt(&[0.5, 0.5], &[0.45, 0.55]);
        assert!((jade.mu_cr() - 0.23).abs() < 1e-12);
    }

    #[test]
    fn test_cr_adaptation_without_pmcrade() {
        let limits = Limits::uniform(2, -1.0, 1.0).unwrap();
        let config = JadeConfig {
            population_size: 6,
            pmcrade: false,
            ..Default::default()
        };
        let mut jade = Jade::new(&neg_sphere, limits, config, Vec::new(), StdRng::seed_from_u64(1)).unwrap();
        jade.mu_cr = 0.2;
        jade.mu_f = 0.5;
        jade.adapt(&[0.4, 0.8], &[0.1, 0.9]);
        assert!((jade.mu_cr() - 0.23).abs() < 1e-12);
        // Lehmer mean (0.16 + 0.64) / 1.2
        let expected_f = 0.9 * 0.5 + 0.1 * (0.8 / 1.2);
        assert!((jade.mu_f() - expected_f).abs() < 1e-12);
    }

    #[test]
    fn test_feed_is_used() {
        let limits = Limits::uniform(2, -1.0, 1.0).unwrap();
        let config = JadeConfig {
            population_size: 10,
            ..Default::default()
        };
        let jade = Jade::new(
            &neg_sphere,
            limits,
            config,
            vec![vec![0.0, 0.0]],
            StdRng::seed_from_u64(5),
        )
        .unwrap();
        assert_eq!(jade.best().1, 0.0);
        assert_eq!(jade.best().0, &[0.0, 0.0]);
    }

    #[test]
    fn test_feed_dimension_checked() {
        let limits = Limits::uniform(2, -1.0, 1.0).unwrap();
        let result = Jade::new(
            &neg_sphere,
            limits,
            JadeConfig::default(),
            vec![vec![0.0]],
            StdRng::seed_from_u64(5),
        );
        assert!(matches!(result, Err(Error::GenomeLength { expected: 2, actual: 1 })));
    }
}
