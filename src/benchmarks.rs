//! The classic f1..f13 test suite for real-parameter optimizers.
//!
//! All functions are minimization problems. Two formula sets are kept, see
//! [`Formulation`]. The optimizers in this crate maximize, so drivers wrap
//! the functions with [`Benchmark::as_maximization`].

use std::f64::consts::{E, PI};
use std::fmt;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::limits::Limits;

/// Offset that moves the Schwefel 2.26 minimum to zero
const SCHWEFEL_OFFSET: f64 = 418.98288727243369;

/// Which set of formulas the suite evaluates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Formulation {
    /// The forms the project's recorded benchmark runs use. f3 squares the
    /// prefix sum before each element, f6 has no floor, f7 weights from 0
    /// with noise on every term, f10 uses the plain mean of squares and the
    /// f11 product term is always zero.
    #[default]
    Legacy,
    /// Yao, Liu and Lin (1999)
    Textbook,
}

/// One benchmark function with its symmetric search bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Benchmark {
    Sphere,
    Schwefel222,
    Schwefel12,
    Schwefel221,
    Rosenbrock,
    Step,
    QuarticNoise,
    Schwefel226,
    Rastrigin,
    Ackley,
    Griewank,
    Penalized1,
    Penalized2,
}

impl Benchmark {
    pub const ALL: [Benchmark; 13] = [
        Benchmark::Sphere,
        Benchmark::Schwefel222,
        Benchmark::Schwefel12,
        Benchmark::Schwefel221,
        Benchmark::Rosenbrock,
        Benchmark::Step,
        Benchmark::QuarticNoise,
        Benchmark::Schwefel226,
        Benchmark::Rastrigin,
        Benchmark::Ackley,
        Benchmark::Griewank,
        Benchmark::Penalized1,
        Benchmark::Penalized2,
    ];

    /// Look up `f{index}` with the usual 1-based numbering
    pub fn by_index(index: usize) -> Result<Self> {
        index
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(Error::UnknownBenchmark(index))
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&b| b == self).map(|i| i + 1).unwrap_or(0)
    }

    pub fn name(self) -> &'static str {
        match self {
            Benchmark::Sphere => "sphere",
            Benchmark::Schwefel222 => "schwefel-2.22",
            Benchmark::Schwefel12 => "schwefel-1.2",
            Benchmark::Schwefel221 => "schwefel-2.21",
            Benchmark::Rosenbrock => "rosenbrock",
            Benchmark::Step => "step",
            Benchmark::QuarticNoise => "quartic-noise",
            Benchmark::Schwefel226 => "schwefel-2.26",
            Benchmark::Rastrigin => "rastrigin",
            Benchmark::Ackley => "ackley",
            Benchmark::Griewank => "griewank",
            Benchmark::Penalized1 => "penalized-1",
            Benchmark::Penalized2 => "penalized-2",
        }
    }

    /// Half-width of the search interval `[-bound, bound]`
    pub fn bound(self) -> f64 {
        match self {
            Benchmark::Sphere => 100.0,
            Benchmark::Schwefel222 => 10.0,
            Benchmark::Schwefel12 => 100.0,
            Benchmark::Schwefel221 => 100.0,
            Benchmark::Rosenbrock => 30.0,
            Benchmark::Step => 100.0,
            Benchmark::QuarticNoise => 1.28,
            Benchmark::Schwefel226 => 500.0,
            Benchmark::Rastrigin => 5.12,
            Benchmark::Ackley => 32.0,
            Benchmark::Griewank => 600.0,
            Benchmark::Penalized1 => 50.0,
            Benchmark::Penalized2 => 50.0,
        }
    }

    pub fn limits(self, dim: usize) -> Result<Limits> {
        Limits::uniform(dim, -self.bound(), self.bound())
    }

    /// Evaluate the legacy forms with the thread-local RNG supplying f7's noise
    pub fn evaluate(self, x: &[f64]) -> f64 {
        self.evaluate_with(Formulation::Legacy, x, &mut rand::thread_rng())
    }

    pub fn evaluate_with<R: Rng + ?Sized>(self, formulation: Formulation, x: &[f64], rng: &mut R) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let textbook = formulation == Formulation::Textbook;
        match self {
            Benchmark::Sphere => x.iter().map(|v| v * v).sum(),
            Benchmark::Schwefel222 => {
                x.iter().map(|v| v.abs()).sum::<f64>() + x.iter().map(|v| v.abs()).product::<f64>()
            }
            Benchmark::Schwefel12 => {
                let mut prefix = 0.0;
                x.iter()
                    .map(|v| {
                        let before = prefix;
                        prefix += v;
                        let term = if textbook { prefix } else { before };
                        term * term
                    })
                    .sum()
            }
            Benchmark::Schwefel221 => x.iter().fold(0.0, |m, v| m.max(v.abs())),
            Benchmark::Rosenbrock => x
                .windows(2)
                .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (w[0] - 1.0).powi(2))
                .sum(),
            Benchmark::Step => {
                if textbook {
                    x.iter().map(|v| (v + 0.5).floor().powi(2)).sum()
                } else {
                    x.iter().map(|v| (v + 0.5).powi(2)).sum()
                }
            }
            Benchmark::QuarticNoise => {
                if textbook {
                    x.iter()
                        .enumerate()
                        .map(|(i, v)| (i + 1) as f64 * v.powi(4))
                        .sum::<f64>()
                        + rng.gen::<f64>()
                } else {
                    // noise on every term
                    x.iter()
                        .enumerate()
                        .map(|(i, v)| i as f64 * v.powi(4) + rng.gen::<f64>())
                        .sum()
                }
            }
            Benchmark::Schwefel226 => {
                x.len() as f64 * SCHWEFEL_OFFSET - x.iter().map(|v| v * v.abs().sqrt().sin()).sum::<f64>()
            }
            Benchmark::Rastrigin => x
                .iter()
                .map(|v| v * v - 10.0 * (2.0 * PI * v).cos() + 10.0)
                .sum(),
            Benchmark::Ackley => {
                let n = x.len() as f64;
                let mean_sq = x.iter().map(|v| v * v).sum::<f64>() / n;
                let mean_cos = x.iter().map(|v| (2.0 * PI * v).cos()).sum::<f64>() / n;
                let spread = if textbook { mean_sq.sqrt() } else { mean_sq };
                -20.0 * (-0.2 * spread).exp() - mean_cos.exp() + 20.0 + E
            }
            Benchmark::Griewank => {
                let sum = x.iter().map(|v| v * v).sum::<f64>() / 4000.0;
                let start = if textbook { 1.0 } else { 0.0 };
                let product = x
                    .iter()
                    .enumerate()
                    .fold(start, |acc, (i, v)| acc * (v / ((i + 1) as f64).sqrt()).cos());
                sum - product + 1.0
            }
            Benchmark::Penalized1 => {
                let y = |v: f64| 1.0 + (v + 1.0) / 4.0;
                let n = x.len();
                let inner: f64 = x
                    .windows(2)
                    .map(|w| (y(w[0]) - 1.0).powi(2) * (1.0 + 10.0 * (PI * y(w[1])).sin().powi(2)))
                    .sum();
                let penalty: f64 = x.iter().map(|&v| penalty(v, 10.0, 100.0, 4)).sum();
                PI / n as f64
                    * (10.0 * (PI * y(x[0])).sin().powi(2) + inner + (y(x[n - 1]) - 1.0).powi(2))
                    + penalty
            }
            Benchmark::Penalized2 => {
                let last = x[x.len() - 1];
                let inner: f64 = x
                    .windows(2)
                    .map(|w| (w[0] - 1.0).powi(2) * (1.0 + (3.0 * PI * w[1]).sin().powi(2)))
                    .sum();
                let penalty: f64 = x.iter().map(|&v| penalty(v, 5.0, 100.0, 4)).sum();
                0.1 * ((3.0 * PI * x[0]).sin().powi(2)
                    + inner
                    + (last - 1.0).powi(2) * (1.0 + (2.0 * PI * last).sin().powi(2)))
                    + penalty
            }
        }
    }

    /// Negated objective, ready for the maximizing optimizers.
    ///
    /// f7's noise comes from an RNG keyed on `noise_seed` and the point, so
    /// a seeded run reproduces regardless of evaluation order.
    pub fn as_maximization(self, formulation: Formulation, noise_seed: u64) -> impl Fn(&[f64]) -> f64 + Sync {
        move |x: &[f64]| {
            let mut rng = StdRng::seed_from_u64(noise_key(noise_seed, x));
            -self.evaluate_with(formulation, x, &mut rng)
        }
    }
}

fn noise_key(seed: u64, x: &[f64]) -> u64 {
    x.iter()
        .fold(seed, |h, v| (h.rotate_left(13) ^ v.to_bits()).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} ({})", self.index(), self.name())
    }
}

/// Boundary penalty `u(x, a, k, m)` of the penalized functions
pub fn penalty(x: f64, a: f64, k: f64, m: i32) -> f64 {
    if x > a {
        k * (x - a).powi(m)
    } else if x < -a {
        k * (-x - a).powi(m)
    } else {
        0.0
    }
}

/// A sampled two-dimensional slice of a benchmark
#[derive(Debug, Clone)]
pub struct Surface {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    /// Row-major: `values[j][i]` is `f(xs[i], ys[j])`
    pub values: Vec<Vec<f64>>,
}

impl Surface {
    /// CSV with one `x,y,f` row per grid point
    pub fn to_csv(&self) -> String {
        let mut out = String::from("x,y,f\n");
        for (j, y) in self.ys.iter().enumerate() {
            for (i, x) in self.xs.iter().enumerate() {
                out.push_str(&format!("{},{},{}\n", x, y, self.values[j][i]));
            }
        }
        out
    }
}

/// Sample `f(x, y)` on a `resolution x resolution` grid across the bounds
pub fn surface(benchmark: Benchmark, formulation: Formulation, resolution: usize) -> Surface {
    let bound = benchmark.bound();
    let axis: Vec<f64> = match resolution {
        0 => Vec::new(),
        1 => vec![0.0],
        n => (0..n)
            .map(|i| -bound + 2.0 * bound * i as f64 / (n - 1) as f64)
            .collect(),
    };
    let values = axis
        .iter()
        .map(|&y| {
            axis.iter()
                .map(|&x| benchmark.evaluate_with(formulation, &[x, y], &mut rand::thread_rng()))
                .collect()
        })
        .collect();
    Surface {
        xs: axis.clone(),
        ys: axis,
        values,
    }
}
