//! Error types shared by the optimizers, the fitness adapters and the drivers.

use thiserror::Error;

/// Unified error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Search-space bounds that cannot contain a point
    #[error("Invalid limits: {0}")]
    InvalidLimits(String),

    /// Algorithm parameters that violate their constraints
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Genome with the wrong number of genes for its design
    #[error("Genome has {actual} genes, expected {expected}")]
    GenomeLength { expected: usize, actual: usize },

    #[error("Unknown benchmark function f{0} (valid: f1..f13)")]
    UnknownBenchmark(usize),

    /// Failure inside the embedded Python scattering bridge
    #[error("Scattering bridge error: {0}")]
    Bridge(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl From<pyo3::PyErr> for Error {
    fn from(err: pyo3::PyErr) -> Self {
        Error::Bridge(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
