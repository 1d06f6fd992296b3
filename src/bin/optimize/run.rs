//! `optimize run`: full layered design search

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;

use dipole_evo::driver::{optimize, Algorithm};
use dipole_evo::fitness::is_better;
use dipole_evo::persistence;
use dipole_evo::scattering::{LayeredDesign, SphereMl};
use dipole_evo::Result;

use crate::config::Config;

pub fn run_layered(
    config: &Config,
    solver: SphereMl,
    algorithm: Algorithm,
    layers: usize,
    verbose: bool,
    interrupt_flag: &AtomicBool,
    rng: &mut StdRng,
) -> Result<()> {
    let design = LayeredDesign::new(layers, config.setup.clone(), solver);
    let limits = design.limits(&config.ranges)?;

    let mut settings = config.algorithms.clone();
    if verbose {
        settings.genetic.log = true;
        settings.one_plus_one.log = true;
    }

    println!("Configuration:");
    println!("  Algorithm: {}", algorithm);
    println!("  Layers: {} (genome length {})", layers, design.genome_len());
    println!("  Wavelength: {} µm", config.setup.wavelength);
    println!("  Generation cap: {}", config.run.max_generations);
    println!();

    let start = Instant::now();
    let mut generation = 0usize;
    let mut best_seen = f64::NAN;
    let max_generations = config.run.max_generations;

    let observer = |fitness: f64| {
        generation += 1;
        if is_better(fitness, best_seen) {
            best_seen = fitness;
            println!(
                "🎯 Gen {:>6} | directivity {:.6} | {:.1}s",
                generation,
                fitness,
                start.elapsed().as_secs_f64()
            );
        }
        if interrupt_flag.load(Ordering::SeqCst) || generation >= max_generations {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };

    let outcome = optimize(algorithm, &design, &limits, &settings, observer, rng)?;

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  RESULT");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Directivity: {:.6}", outcome.fitness);
    println!("  Generations: {}", outcome.generations);
    println!("  Evaluations: {}", outcome.evaluations);
    if outcome.restarts > 0 {
        println!("  Restarts: {}", outcome.restarts);
    }
    println!("  Genome: {:?}", outcome.best);
    match design.request(&outcome.best) {
        Ok(request) => {
            println!("  Radii (µm): {:?}", request.radii);
            println!("  Permittivities: {:?}", request.permittivities);
            println!("  Dipole position (µm): {}", request.dipole_position);
        }
        Err(e) => log::warn!("Could not decode best genome: {}", e),
    }

    std::fs::create_dir_all(&config.paths.output_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let base = config
        .paths
        .output_dir
        .join(format!("{}_{}layers_{}", algorithm, layers, stamp));
    let path = persistence::save(&outcome, &base)?;
    println!("  Saved: {}", path.display());
    Ok(())
}
