//! One entry point over the three optimizers, as used by the binaries.

use std::fmt;
use std::ops::ControlFlow;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fitness::FitnessFunction;
use crate::genetic::{genetic, GeneticConfig};
use crate::jade::{Jade, JadeConfig};
use crate::limits::Limits;
use crate::one_plus_one::{one_plus_one, OnePlusOneConfig};
use crate::outcome::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Genetic,
    OnePlusOne,
    Jade,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Genetic => "genetic",
            Algorithm::OnePlusOne => "one-plus-one",
            Algorithm::Jade => "jade",
        };
        f.write_str(name)
    }
}

/// Parameters for every algorithm; only the selected one is used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmSettings {
    #[serde(default)]
    pub genetic: GeneticConfig,
    #[serde(default)]
    pub one_plus_one: OnePlusOneConfig,
    #[serde(default)]
    pub jade: JadeConfig,
    /// Generation cap for JADE; the other two carry their own limits
    #[serde(default = "default_jade_generations")]
    pub jade_generations: usize,
}

fn default_jade_generations() -> usize {
    1000
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            genetic: GeneticConfig::default(),
            one_plus_one: OnePlusOneConfig::default(),
            jade: JadeConfig::default(),
            jade_generations: default_jade_generations(),
        }
    }
}

/// Run `algorithm` on `fitness` until its own termination rule or the
/// observer stops it
pub fn optimize<F, O, R>(
    algorithm: Algorithm,
    fitness: &F,
    limits: &Limits,
    settings: &AlgorithmSettings,
    mut observer: O,
    rng: &mut R,
) -> Result<RunOutcome>
where
    F: FitnessFunction + ?Sized,
    O: FnMut(f64) -> ControlFlow<()>,
    R: Rng + ?Sized,
{
    match algorithm {
        Algorithm::Genetic => genetic(fitness, limits, &settings.genetic, observer, rng),
        Algorithm::OnePlusOne => one_plus_one(fitness, limits, &settings.one_plus_one, observer, rng),
        Algorithm::Jade => {
            let jade_rng = StdRng::seed_from_u64(rng.gen());
            let mut jade = Jade::new(fitness, limits.clone(), settings.jade.clone(), Vec::new(), jade_rng)?;
            for _ in 0..settings.jade_generations {
                if observer(jade.best().1).is_break() {
                    break;
                }
                jade.step();
            }
            Ok(jade.outcome())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neg_sphere(x: &[f64]) -> f64 {
        -x.iter().map(|v| v * v).sum::<f64>()
    }

    #[test]
    fn test_every_algorithm_runs() {
        let limits = Limits::uniform(3, -5.0, 5.0).unwrap();
        let settings = AlgorithmSettings {
            genetic: GeneticConfig {
                generations: 20,
                ..Default::default()
            },
            one_plus_one: OnePlusOneConfig {
                max_plateau: 20,
                max_restarts: Some(1),
                log: false,
            },
            jade: JadeConfig {
                population_size: 10,
                ..Default::default()
            },
            jade_generations: 20,
        };
        for algorithm in [Algorithm::Genetic, Algorithm::OnePlusOne, Algorithm::Jade] {
            let mut rng = StdRng::seed_from_u64(17);
            let outcome = optimize(
                algorithm,
                &neg_sphere,
                &limits,
                &settings,
                |_f: f64| ControlFlow::Continue(()),
                &mut rng,
            )
            .unwrap();
            assert!(limits.contains(&outcome.best), "{} escaped the limits", algorithm);
            assert!(outcome.fitness <= 0.0);
            assert!(outcome.evaluations > 0);
        }
    }

    #[test]
    fn test_jade_honours_observer() {
        let limits = Limits::uniform(2, -1.0, 1.0).unwrap();
        let settings = AlgorithmSettings {
            jade: JadeConfig {
                population_size: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let mut calls = 0;
        let outcome = optimize(
            Algorithm::Jade,
            &neg_sphere,
            &limits,
            &settings,
            |_f: f64| {
                calls += 1;
                if calls > 5 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.generations, 5);
    }

    #[test]
    fn test_algorithm_names_round_trip_through_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            algorithm: Algorithm,
        }
        let parsed: Wrapper = toml::from_str("algorithm = \"one-plus-one\"").unwrap();
        assert_eq!(parsed.algorithm, Algorithm::OnePlusOne);
        assert_eq!(Algorithm::OnePlusOne.to_string(), "one-plus-one");
    }
}
