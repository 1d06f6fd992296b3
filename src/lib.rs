//! Dipole Directivity Explorer - Library
//!
//! Evolutionary optimizers for bounded real vectors, aimed at the
//! emission directivity of a dipole inside a multilayer sphere. The
//! classic f1..f13 benchmark suite is included for calibrating them.

pub mod benchmarks;
pub mod driver;
pub mod error;
pub mod fitness;
pub mod genetic;
pub mod jade;
pub mod limits;
pub mod one_plus_one;
pub mod operators;
pub mod outcome;
pub mod persistence;
pub mod scattering;

pub use error::{Error, Result};
