//! Dipole Directivity Explorer - optimizer driver
//!
//! Subcommands:
//! 1. `run`   - optimize a layered sphere and dipole position for maximum directivity
//! 2. `sweep` - JADE on the normalized design across a range of size ratios
//! 3. `scan`  - directivity along the radial dipole position of a fixed sphere
//!
//! The electromagnetic model is the `sphereml` Python module, which must be
//! importable from the working directory or the active virtualenv.

mod config;
mod run;
mod scan;
mod sweep;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use dipole_evo::scattering::SphereMl;

use config::{Args, Command, Config};

fn main() {
    env_logger::init();
    let args = Args::parse();
    let config = Config::load(&args.config);

    let seed = args.seed.or(config.run.seed).unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    print_banner(&args.command, seed);

    println!("Initializing sphereml bridge...");
    let solver = match SphereMl::init() {
        Ok(solver) => solver,
        Err(e) => {
            eprintln!("Failed to initialize sphereml bridge: {}", e);
            eprintln!("Build the sphereml Python module and run from its directory or virtualenv.");
            std::process::exit(1);
        }
    };
    println!("  Bridge ready");
    println!();

    let interrupt_flag = Arc::new(AtomicBool::new(false));
    setup_interrupt_handler(interrupt_flag.clone());

    let result = match args.command {
        Command::Run {
            algorithm,
            layers,
            verbose,
        } => run::run_layered(
            &config,
            solver,
            algorithm.unwrap_or(config.run.algorithm),
            layers.unwrap_or(config.run.layers),
            verbose,
            &interrupt_flag,
            &mut rng,
        ),
        Command::Sweep { iterations } => {
            let mut sweep_config = config.sweep.clone();
            if let Some(n) = iterations {
                sweep_config.iterations = n;
            }
            sweep::run_sweep(&config, &sweep_config, solver, &interrupt_flag, &mut rng)
        }
        Command::Scan { step, count, orders } => scan::run_scan(&config, &solver, step, count, &orders),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner(command: &Command, seed: u64) {
    let mode = match command {
        Command::Run { .. } => "layered design optimization",
        Command::Sweep { .. } => "size-ratio sweep",
        Command::Scan { .. } => "dipole position scan",
    };
    println!("═══════════════════════════════════════════════════════════════");
    println!("  DIPOLE DIRECTIVITY EXPLORER - {}", mode);
    println!("  Seed: {}", seed);
    println!("═══════════════════════════════════════════════════════════════");
    println!();
}

fn setup_interrupt_handler(interrupt_flag: Arc<AtomicBool>) {
    let interrupt_count = Arc::new(AtomicUsize::new(0));
    let ic = interrupt_count.clone();
    let if_clone = interrupt_flag.clone();

    let installed = ctrlc::set_handler(move || {
        let count = ic.fetch_add(1, Ordering::SeqCst);
        if_clone.store(true, Ordering::SeqCst);
        if count == 0 {
            eprintln!("\nInterrupt received, finishing current generation and saving...");
        } else {
            eprintln!("\nForce quit.");
            std::process::exit(1);
        }
    });
    if let Err(e) = installed {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }
}
