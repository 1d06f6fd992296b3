//! Configuration loading and CLI argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use dipole_evo::driver::{Algorithm, AlgorithmSettings};
use dipole_evo::scattering::{LayeredRanges, ScatteringSetup};

#[derive(Parser, Debug)]
#[command(name = "optimize")]
#[command(about = "Evolutionary search for high-directivity dipole/multilayer-sphere designs")]
pub struct Args {
    /// Path to config file
    #[arg(short = 'c', long, default_value = "config.toml", global = true)]
    pub config: String,

    /// RNG seed (overrides config; random when neither is set)
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Optimize the layered design (radii, complex permittivities, dipole position)
    Run {
        /// Optimizer (overrides config)
        #[arg(short = 'a', long, value_enum)]
        algorithm: Option<Algorithm>,

        /// Number of shell layers (overrides config)
        #[arg(short = 'l', long)]
        layers: Option<usize>,

        /// Log every generation's best and applicant
        #[arg(short = 'v', long)]
        verbose: bool,
    },
    /// Sweep the size ratio and optimize the normalized design with JADE at each step
    Sweep {
        /// Total JADE generations per ratio (overrides config)
        #[arg(long)]
        iterations: Option<usize>,
    },
    /// Directivity as the dipole moves outward through a fixed sphere
    Scan {
        /// Step between dipole positions in µm
        #[arg(long, default_value_t = 0.001 * std::f64::consts::SQRT_2)]
        step: f64,

        /// Number of positions
        #[arg(long, default_value_t = 138)]
        count: usize,

        /// Multipole orders, one output column each
        #[arg(long, value_delimiter = ',', default_values_t = [8, 75])]
        orders: Vec<usize>,
    },
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub algorithms: AlgorithmSettings,
    #[serde(default)]
    pub setup: ScatteringSetup,
    #[serde(default)]
    pub ranges: LayeredRanges,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    #[serde(default = "default_layers")]
    pub layers: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Hard cap on observed generations across restarts
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
}

fn default_algorithm() -> Algorithm {
    Algorithm::Genetic
}
fn default_layers() -> usize {
    2
}
fn default_max_generations() -> usize {
    100_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            layers: default_layers(),
            seed: None,
            max_generations: default_max_generations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_layers")]
    pub layers: usize,
    #[serde(default = "default_ratio_start")]
    pub ratio_start: f64,
    #[serde(default = "default_ratio_end")]
    pub ratio_end: f64,
    #[serde(default = "default_ratio_step")]
    pub ratio_step: f64,
    /// Total JADE generations per ratio
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Generations per `run` call between progress reports
    #[serde(default = "default_chunk")]
    pub chunk: usize,
    /// Progress lines are appended whenever the total is a multiple of this
    #[serde(default = "default_log_every")]
    pub log_every: usize,
    #[serde(default = "default_max_index")]
    pub max_index: f64,
    #[serde(default = "default_population")]
    pub population_size: usize,
    /// Multipole order passed to the solver
    #[serde(default = "default_sweep_order")]
    pub max_order: usize,
    /// Observation polar angle; the sweep looks along the dipole axis
    #[serde(default)]
    pub theta: f64,
}

fn default_sweep_layers() -> usize {
    3
}
fn default_ratio_start() -> f64 {
    0.1
}
fn default_ratio_end() -> f64 {
    2.0
}
fn default_ratio_step() -> f64 {
    0.01
}
fn default_iterations() -> usize {
    5000
}
fn default_chunk() -> usize {
    20
}
fn default_log_every() -> usize {
    10
}
fn default_max_index() -> f64 {
    40.0
}
fn default_population() -> usize {
    75
}
fn default_sweep_order() -> usize {
    50
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            layers: default_sweep_layers(),
            ratio_start: default_ratio_start(),
            ratio_end: default_ratio_end(),
            ratio_step: default_ratio_step(),
            iterations: default_iterations(),
            chunk: default_chunk(),
            log_every: default_log_every(),
            max_index: default_max_index(),
            population_size: default_population(),
            max_order: default_sweep_order(),
            theta: 0.0,
        }
    }
}

impl SweepConfig {
    /// Ratios from start to end inclusive, tolerant of float accumulation
    pub fn ratios(&self) -> Vec<f64> {
        if self.ratio_step <= 0.0 || self.ratio_end < self.ratio_start {
            return vec![self.ratio_start];
        }
        let steps = ((self.ratio_end - self.ratio_start) / self.ratio_step + 1e-6).floor() as usize;
        (0..=steps)
            .map(|i| self.ratio_start + i as f64 * self.ratio_step)
            .collect()
    }
}

/// The fixed sphere used by the position scan
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Layer radii in µm, innermost first
    #[serde(default = "default_scan_radii")]
    pub radii: Vec<f64>,
    /// Real layer permittivities, innermost first
    #[serde(default = "default_scan_permittivities")]
    pub permittivities: Vec<f64>,
}

fn default_scan_radii() -> Vec<f64> {
    vec![0.09, 0.11, 0.13]
}
fn default_scan_permittivities() -> Vec<f64> {
    vec![4.0, 6.0, 8.0]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            radii: default_scan_radii(),
            permittivities: default_scan_permittivities(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Failed to parse {}: {}", path, e);
                Config::default()
            }),
            Err(_) => {
                log::warn!("No config file at {}, using defaults", path);
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_ratios_cover_range() {
        let ratios = SweepConfig::default().ratios();
        assert_eq!(ratios.len(), 191);
        assert!((ratios[0] - 0.1).abs() < 1e-12);
        assert!((ratios[190] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [run]
            algorithm = "jade"
            layers = 3

            [algorithms.genetic]
            population_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.run.algorithm, Algorithm::Jade);
        assert_eq!(config.run.layers, 3);
        assert_eq!(config.algorithms.genetic.population_size, 50);
        assert_eq!(config.algorithms.genetic.generations, 300);
        assert_eq!(config.setup.wavelength, 0.455);
        assert_eq!(config.sweep.iterations, 5000);
    }
}
