//! Gzip-compressed JSON result files.
//!
//! `save(obj, "runs/best")` writes `runs/best.gz`; `load("runs/best")`
//! reads it back. The extension is always appended.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub const EXTENSION: &str = "gz";

/// `filename` with the compressed-file extension appended
pub fn compressed_path(filename: impl AsRef<Path>) -> PathBuf {
    let mut path = filename.as_ref().as_os_str().to_owned();
    path.push(".");
    path.push(EXTENSION);
    PathBuf::from(path)
}

pub fn save<T: Serialize + ?Sized>(obj: &T, filename: impl AsRef<Path>) -> Result<PathBuf> {
    let path = compressed_path(filename);
    let file = File::create(&path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, obj)?;
    encoder.finish()?.flush()?;
    Ok(path)
}

pub fn load<T: DeserializeOwned>(filename: impl AsRef<Path>) -> Result<T> {
    let file = File::open(compressed_path(filename))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    Ok(serde_json::from_reader(decoder)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::outcome::{GenerationStats, RunOutcome};
    use tempfile::tempdir;

    #[test]
    fn test_extension_is_appended() {
        assert_eq!(compressed_path("out/run.json"), PathBuf::from("out/run.json.gz"));
    }

    #[test]
    fn test_save_and_load_outcome() {
        let dir = tempdir().unwrap();
        let outcome = RunOutcome {
            best: vec![120.5, 80.25, 3.1, 0.0, 4.4, 0.0, 30.0],
            fitness: 15.0996,
            generations: 300,
            evaluations: 3120,
            restarts: 0,
            history: vec![GenerationStats::from_scores(0, &[1.0, 2.0], 2)],
        };
        let base = dir.path().join("best");
        let written = save(&outcome, &base).unwrap();
        assert!(written.ends_with("best.gz"));
        assert!(written.exists());

        let loaded: RunOutcome = load(&base).unwrap();
        assert_eq!(loaded.best, outcome.best);
        assert_eq!(loaded.fitness, outcome.fitness);
        assert_eq!(loaded.history.len(), 1);
    }

    #[test]
    fn test_failed_run_loads_back() {
        let dir = tempdir().unwrap();
        let outcome = RunOutcome {
            best: vec![150.0, 2.0, 0.0, 60.0],
            fitness: f64::NAN,
            generations: 1,
            evaluations: 20,
            restarts: 0,
            history: vec![GenerationStats::from_scores(0, &[f64::NAN; 20], 20)],
        };
        let base = dir.path().join("diverged");
        save(&outcome, &base).unwrap();

        let loaded: RunOutcome = load(&base).unwrap();
        assert!(loaded.fitness.is_nan());
        assert!(loaded.history[0].best_fitness.is_nan());
        assert_eq!(loaded.history[0].nan_count, 20);
    }

    #[test]
    fn test_file_is_compressed() {
        let dir = tempdir().unwrap();
        let data = vec![0.0f64; 10_000];
        let path = save(&data, dir.path().join("zeros")).unwrap();
        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size < 1000, "Expected gzip to shrink repetitive data, got {} bytes", size);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result: Result<Vec<f64>> = load(dir.path().join("nothing"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
