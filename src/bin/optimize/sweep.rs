//! `optimize sweep`: best normalized design for each size ratio

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use dipole_evo::jade::{Jade, JadeConfig};
use dipole_evo::outcome::nan_as_null;
use dipole_evo::persistence;
use dipole_evo::scattering::{DirectivitySolver, NormalizedDesign, ScatteringSetup, SphereMl};
use dipole_evo::Result;

use crate::config::{Config, SweepConfig};

/// Best directivity found for one size ratio
#[derive(Debug, Clone, Serialize)]
pub struct SweepPoint {
    pub max_ratio: f64,
    #[serde(with = "nan_as_null")]
    pub fitness: f64,
    pub best: Vec<f64>,
    pub generations: usize,
}

/// Tag shared by the progress log and the saved result
fn run_tag(sweep: &SweepConfig, rng: &mut StdRng) -> String {
    format!(
        "index{:03.0}-N{}-iterations{}-{:05}",
        sweep.max_index,
        sweep.max_order,
        sweep.iterations,
        rng.gen_range(0..=99_999)
    )
}

/// `n_total max_ratio fit [best...]`
fn progress_line(generations: usize, max_ratio: f64, fitness: f64, best: &[f64]) -> String {
    format!("{} {} {} {:?}", generations, max_ratio, fitness, best)
}

fn append_progress(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Run JADE on one ratio in chunks of `sweep.chunk` generations until the
/// total passes `sweep.iterations` or an interrupt arrives.
fn optimize_ratio<S: DirectivitySolver>(
    design: &NormalizedDesign<S>,
    jade_config: &JadeConfig,
    sweep: &SweepConfig,
    progress_path: &Path,
    interrupt_flag: &AtomicBool,
    rng: &mut StdRng,
) -> Result<SweepPoint> {
    let chunk = sweep.chunk.max(1);
    let log_every = sweep.log_every.max(1);
    let mut jade = Jade::new(
        design,
        design.limits()?,
        jade_config.clone(),
        Vec::new(),
        StdRng::seed_from_u64(rng.gen()),
    )?;

    let mut total = 0usize;
    loop {
        let fitness = jade.run(chunk);
        total += chunk;
        println!("{} {}", total, fitness);
        if total % log_every == 0 {
            let line = progress_line(total, design.max_ratio, fitness, jade.best().0);
            println!("==> {}", line);
            append_progress(progress_path, &line)?;
        }
        if interrupt_flag.load(Ordering::SeqCst) || total > sweep.iterations {
            break;
        }
    }

    let (best, fitness) = jade.best();
    Ok(SweepPoint {
        max_ratio: design.max_ratio,
        fitness,
        best: best.to_vec(),
        generations: total,
    })
}

pub fn run_sweep(
    config: &Config,
    sweep: &SweepConfig,
    solver: SphereMl,
    interrupt_flag: &AtomicBool,
    rng: &mut StdRng,
) -> Result<()> {
    let setup = ScatteringSetup {
        theta: sweep.theta,
        max_order: Some(sweep.max_order),
        ..config.setup.clone()
    };
    let jade_config = JadeConfig {
        population_size: sweep.population_size,
        ..config.algorithms.jade.clone()
    };
    jade_config.validate()?;

    let tag = run_tag(sweep, rng);
    std::fs::create_dir_all(&config.paths.output_dir)?;
    let progress_path = config.paths.output_dir.join(format!("out3_{}.txt", tag));
    let ratios = sweep.ratios();

    println!("Sweep {}", tag);
    println!("  Ratios: {} from {} to {}", ratios.len(), sweep.ratio_start, sweep.ratio_end);
    println!("  Layers: {}", sweep.layers);
    println!("  Progress log: {}", progress_path.display());
    println!();

    let mut points = Vec::with_capacity(ratios.len());
    for max_ratio in ratios {
        let mut design = NormalizedDesign::new(sweep.layers, max_ratio, setup.clone(), solver);
        design.max_index = sweep.max_index;
        let point = optimize_ratio(&design, &jade_config, sweep, &progress_path, interrupt_flag, rng)?;
        println!("[{}, {}]", point.max_ratio, point.fitness);
        points.push(point);
        if interrupt_flag.load(Ordering::SeqCst) {
            break;
        }
    }

    println!("--final--");
    for point in &points {
        println!("{} {}", point.max_ratio, point.fitness);
    }

    let path = persistence::save(&points, config.paths.output_dir.join(format!("sweep_{}", tag)))?;
    println!("Saved: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dipole_evo::scattering::DirectivityRequest;
    use tempfile::tempdir;

    /// Directivity grows with the outer radius and the first permittivity
    struct MockSolver;

    impl DirectivitySolver for MockSolver {
        fn directivity(&self, request: &DirectivityRequest) -> Result<f64> {
            Ok(request.radii.last().copied().unwrap_or(0.0) + request.permittivities[0].re)
        }
    }

    fn small_sweep() -> SweepConfig {
        SweepConfig {
            layers: 2,
            iterations: 45,
            chunk: 10,
            log_every: 20,
            population_size: 6,
            ..Default::default()
        }
    }

    fn small_jade() -> JadeConfig {
        JadeConfig {
            population_size: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_chunks_run_one_past_the_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out3_test.txt");
        let sweep = small_sweep();
        let design = NormalizedDesign::new(2, 0.5, ScatteringSetup::default(), MockSolver);
        let mut rng = StdRng::seed_from_u64(4);

        let point = optimize_ratio(&design, &small_jade(), &sweep, &path, &AtomicBool::new(false), &mut rng).unwrap();
        // 10, 20, .., 50: the first total above 45
        assert_eq!(point.generations, 50);
        assert_eq!(point.max_ratio, 0.5);
        assert_eq!(point.best.len(), 4);
        assert!(point.fitness > 0.0);
    }

    #[test]
    fn test_progress_lines_every_log_interval() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out3_test.txt");
        let sweep = small_sweep();
        let design = NormalizedDesign::new(2, 0.5, ScatteringSetup::default(), MockSolver);
        let mut rng = StdRng::seed_from_u64(4);
        let point = optimize_ratio(&design, &small_jade(), &sweep, &path, &AtomicBool::new(false), &mut rng).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("20 0.5 "));
        assert!(lines[1].starts_with("40 0.5 "));

        let fields: Vec<&str> = lines[1].splitn(4, ' ').collect();
        let logged: f64 = fields[2].parse().unwrap();
        assert!(logged <= point.fitness);
        assert!(fields[3].starts_with('[') && fields[3].ends_with(']'));
        assert_eq!(fields[3].split(", ").count(), 4);
    }

    #[test]
    fn test_interrupt_stops_after_one_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out3_test.txt");
        let design = NormalizedDesign::new(2, 1.0, ScatteringSetup::default(), MockSolver);
        let mut rng = StdRng::seed_from_u64(8);
        let point = optimize_ratio(
            &design,
            &small_jade(),
            &small_sweep(),
            &path,
            &AtomicBool::new(true),
            &mut rng,
        )
        .unwrap();
        assert_eq!(point.generations, 10);
        assert!(!path.exists());
    }

    #[test]
    fn test_progress_line_format() {
        assert_eq!(progress_line(20, 0.1, 3.5, &[0.25, 1.0]), "20 0.1 3.5 [0.25, 1.0]");
    }

    #[test]
    fn test_tag_layout() {
        let mut rng = StdRng::seed_from_u64(0);
        let tag = run_tag(&SweepConfig::default(), &mut rng);
        assert!(tag.starts_with("index040-N50-iterations5000-"), "{}", tag);
        assert_eq!(tag.rsplit('-').next().unwrap().len(), 5);
    }
}
