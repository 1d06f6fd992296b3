//! `optimize scan`: directivity against dipole position

use num_complex::Complex64;

use dipole_evo::scattering::{scan_dipole_position_orders, SphereMl};
use dipole_evo::Result;

use crate::config::Config;

pub fn run_scan(config: &Config, solver: &SphereMl, step: f64, count: usize, orders: &[usize]) -> Result<()> {
    let eps: Vec<Complex64> = config
        .scan
        .permittivities
        .iter()
        .map(|&re| Complex64::new(re, 0.0))
        .collect();

    println!("Radii (µm): {:?}", config.scan.radii);
    println!("Permittivities: {:?}", config.scan.permittivities);
    println!();

    let rows = scan_dipole_position_orders(solver, &config.setup, &config.scan.radii, &eps, step, count, orders)?;

    let mut header = format!("{:>12}", "Rd");
    if orders.is_empty() {
        header.push_str(&format!(" {:>14}", "directivity"));
    }
    for order in orders {
        header.push_str(&format!(" {:>14}", format!("D(N={})", order)));
    }
    println!("{}", header);
    for (position, column) in rows {
        let mut line = format!("{:>12.6}", position);
        for directivity in column {
            line.push_str(&format!(" {:>14.6}", directivity));
        }
        println!("{}", line);
    }
    Ok(())
}
