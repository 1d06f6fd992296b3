//! Box constraints for real-valued search spaces.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-dimension `(lower, upper)` bounds of a search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Limits {
    bounds: Vec<(f64, f64)>,
}

impl Limits {
    pub fn new(bounds: Vec<(f64, f64)>) -> Result<Self> {
        if bounds.is_empty() {
            return Err(Error::InvalidLimits("no dimensions".to_string()));
        }
        for (i, &(lo, hi)) in bounds.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(Error::InvalidLimits(format!(
                    "dimension {} has non-finite bounds ({}, {})",
                    i, lo, hi
                )));
            }
            if lo > hi {
                return Err(Error::InvalidLimits(format!(
                    "dimension {} has lower {} > upper {}",
                    i, lo, hi
                )));
            }
        }
        Ok(Self { bounds })
    }

    /// The same interval repeated for every dimension
    pub fn uniform(dim: usize, lo: f64, hi: f64) -> Result<Self> {
        Self::new(vec![(lo, hi); dim])
    }

    pub fn dim(&self) -> usize {
        self.bounds.len()
    }

    pub fn lower(&self, i: usize) -> f64 {
        self.bounds[i].0
    }

    pub fn upper(&self, i: usize) -> f64 {
        self.bounds[i].1
    }

    pub fn width(&self, i: usize) -> f64 {
        self.bounds[i].1 - self.bounds[i].0
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.bounds.iter()
    }

    /// Uniform random point inside the box
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|&(lo, hi)| if lo < hi { rng.gen_range(lo..hi) } else { lo })
            .collect()
    }

    pub fn clamp(&self, i: usize, value: f64) -> f64 {
        let (lo, hi) = self.bounds[i];
        value.clamp(lo, hi)
    }

    pub fn clamp_all(&self, x: &mut [f64]) {
        for (i, v) in x.iter_mut().enumerate() {
            *v = self.clamp(i, *v);
        }
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.bounds.len()
            && x
                .iter()
                .zip(&self.bounds)
                .all(|(v, &(lo, hi))| *v >= lo && *v <= hi)
    }
}

impl TryFrom<Vec<(f64, f64)>> for Limits {
    type Error = Error;

    fn try_from(bounds: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(bounds)
    }
}

impl From<Limits> for Vec<(f64, f64)> {
    fn from(limits: Limits) -> Self {
        limits.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rejects_bad_bounds() {
        assert!(Limits::new(vec![]).is_err());
        assert!(Limits::new(vec![(1.0, 0.0)]).is_err());
        assert!(Limits::new(vec![(0.0, f64::INFINITY)]).is_err());
        assert!(Limits::new(vec![(f64::NAN, 1.0)]).is_err());
        assert!(Limits::new(vec![(2.0, 2.0)]).is_ok());
    }

    #[test]
    fn test_sample_stays_inside() {
        let mut rng = StdRng::seed_from_u64(7);
        let limits = Limits::new(vec![(-1.0, 1.0), (10.0, 20.0), (3.0, 3.0)]).unwrap();
        for _ in 0..1000 {
            let x = limits.sample(&mut rng);
            assert!(limits.contains(&x), "Sample escaped the box: {:?}", x);
            assert_eq!(x[2], 3.0);
        }
    }

    #[test]
    fn test_clamp_all() {
        let limits = Limits::uniform(3, -5.0, 5.0).unwrap();
        let mut x = vec![-10.0, 0.5, 7.0];
        limits.clamp_all(&mut x);
        assert_eq!(x, vec![-5.0, 0.5, 5.0]);
    }

    #[test]
    fn test_contains_checks_dimension() {
        let limits = Limits::uniform(2, 0.0, 1.0).unwrap();
        assert!(!limits.contains(&[0.5]));
        assert!(limits.contains(&[0.0, 1.0]));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Limits = serde_json::from_str("[[0.0, 1.0], [2.0, 3.0]]").unwrap();
        assert_eq!(ok.dim(), 2);
        let bad: std::result::Result<Limits, _> = serde_json::from_str("[[1.0, 0.0]]");
        assert!(bad.is_err());
    }
}
