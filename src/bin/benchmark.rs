//! Benchmark runner
//!
//! Runs an optimizer on the f1..f13 suite and prints the best objective
//! value reached per function, or samples one function's 2-D surface as CSV.
//!
//! Usage:
//!   benchmark --algorithm jade --functions 1,5,9 --dim 30 --runs 5
//!   benchmark --surface 101 --function 9 --output rastrigin.csv

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dipole_evo::benchmarks::{surface, Benchmark, Formulation};
use dipole_evo::driver::{optimize, Algorithm, AlgorithmSettings};
use dipole_evo::Result;

#[derive(Parser, Debug)]
#[command(name = "benchmark")]
#[command(about = "Calibrate the optimizers on the classic f1..f13 functions")]
struct Args {
    /// Optimizer to run
    #[arg(short = 'a', long, value_enum, default_value_t = Algorithm::Jade)]
    algorithm: Algorithm,

    /// Function numbers, comma separated (default: all thirteen)
    #[arg(short = 'f', long, value_delimiter = ',')]
    functions: Vec<usize>,

    /// Problem dimension
    #[arg(short = 'd', long, default_value_t = 30)]
    dim: usize,

    /// Independent runs per function
    #[arg(short = 'r', long, default_value_t = 1)]
    runs: usize,

    /// Generation cap per run
    #[arg(short = 'g', long, default_value_t = 1500)]
    generations: usize,

    /// Formula set for the suite
    #[arg(long, value_enum, default_value_t = Formulation::Legacy)]
    formulation: Formulation,

    /// TOML file with an algorithm-settings table
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write an N x N surface CSV of `--function` instead of optimizing
    #[arg(long, value_name = "N")]
    surface: Option<usize>,

    /// Function sampled by `--surface`
    #[arg(long, default_value_t = 1)]
    function: usize,

    /// Surface output path (stdout when absent)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

#[derive(Debug)]
struct RunSummary {
    benchmark: Benchmark,
    best: f64,
    mean: f64,
    worst: f64,
    /// Longest run, in generations
    generations: usize,
    evaluations: u64,
    seconds: f64,
}

fn load_settings(path: Option<&PathBuf>) -> AlgorithmSettings {
    let Some(path) = path else {
        return AlgorithmSettings::default();
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Failed to parse {}: {}", path.display(), e);
            AlgorithmSettings::default()
        }),
        Err(e) => {
            log::warn!("Could not read {}: {}, using defaults", path.display(), e);
            AlgorithmSettings::default()
        }
    }
}

/// Algorithm settings with `--generations` applied to every generation limit
fn suite_settings(args: &Args) -> AlgorithmSettings {
    let mut settings = load_settings(args.config.as_ref());
    settings.jade_generations = args.generations;
    settings.genetic.generations = args.generations;
    settings
}

fn write_surface(args: &Args, resolution: usize) -> Result<()> {
    let benchmark = Benchmark::by_index(args.function)?;
    let csv = surface(benchmark, args.formulation, resolution).to_csv();
    match &args.output {
        Some(path) => {
            std::fs::write(path, csv)?;
            println!("Wrote {} surface to {}", benchmark, path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}

fn run_suite(args: &Args) -> Result<Vec<RunSummary>> {
    let benchmarks = if args.functions.is_empty() {
        Benchmark::ALL.to_vec()
    } else {
        args.functions
            .iter()
            .map(|&i| Benchmark::by_index(i))
            .collect::<Result<Vec<_>>>()?
    };
    let settings = suite_settings(args);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut summaries = Vec::with_capacity(benchmarks.len());
    for benchmark in benchmarks {
        let limits = benchmark.limits(args.dim)?;
        let start = Instant::now();
        let mut objectives = Vec::with_capacity(args.runs);
        let mut evaluations = 0;
        let mut generations = 0;

        for run in 0..args.runs.max(1) {
            let objective = benchmark.as_maximization(args.formulation, rng.gen());
            let mut generation = 0usize;
            let cap = args.generations;
            let observer = |_best: f64| {
                generation += 1;
                if generation > cap {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            };
            let outcome = optimize(args.algorithm, &objective, &limits, &settings, observer, &mut rng)?;
            log::info!("{} run {}: {:.6e}", benchmark, run, -outcome.fitness);
            objectives.push(-outcome.fitness);
            evaluations += outcome.evaluations;
            generations = generations.max(outcome.generations);
        }

        let best = objectives.iter().copied().fold(f64::INFINITY, f64::min);
        let worst = objectives.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = objectives.iter().sum::<f64>() / objectives.len() as f64;
        summaries.push(RunSummary {
            benchmark,
            best,
            mean,
            worst,
            generations,
            evaluations,
            seconds: start.elapsed().as_secs_f64(),
        });
    }
    Ok(summaries)
}

fn print_table(args: &Args, summaries: &[RunSummary]) {
    println!();
    println!(
        "{} | {:?} | dim {} | {} run(s) | cap {} generations",
        args.algorithm, args.formulation, args.dim, args.runs, args.generations
    );
    println!("───────────────────────────────────────────────────────────────────────────────");
    println!(
        "{:<22} {:>12} {:>12} {:>12} {:>6} {:>10} {:>8}",
        "function", "best", "mean", "worst", "gens", "evals", "time"
    );
    for s in summaries {
        println!(
            "{:<22} {:>12.4e} {:>12.4e} {:>12.4e} {:>6} {:>10} {:>7.1}s",
            s.benchmark.to_string(),
            s.best,
            s.mean,
            s.worst,
            s.generations,
            s.evaluations,
            s.seconds
        );
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = match args.surface {
        Some(resolution) => write_surface(&args, resolution),
        None => run_suite(&args).map(|summaries| print_table(&args, &summaries)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("benchmark").chain(extra.iter().copied()))
    }

    #[test]
    fn test_generation_cap_reaches_genetic() {
        let args = args(&["-a", "genetic", "-f", "1", "-d", "2", "-g", "350", "--seed", "3"]);
        let settings = suite_settings(&args);
        assert_eq!(settings.genetic.generations, 350);
        assert_eq!(settings.jade_generations, 350);

        let summaries = run_suite(&args).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].generations, 350);
    }

    #[test]
    fn test_seeded_noisy_suite_reproduces() {
        let args = args(&["-a", "jade", "-f", "7", "-d", "3", "-g", "15", "--seed", "21"]);
        let first = run_suite(&args).unwrap();
        let second = run_suite(&args).unwrap();
        assert_eq!(first[0].benchmark, Benchmark::QuarticNoise);
        assert_eq!(first[0].best, second[0].best);
        assert_eq!(first[0].evaluations, second[0].evaluations);
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        let args = args(&["-f", "14"]);
        assert!(run_suite(&args).is_err());
    }
}
