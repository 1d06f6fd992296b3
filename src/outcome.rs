//! Results reported by the optimizers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde adapter for fitness values. JSON has no NaN, so NaN is written as
/// `null` and `null` reads back as NaN.
pub mod nan_as_null {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Statistics for a generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    #[serde(with = "nan_as_null")]
    pub best_fitness: f64,
    #[serde(with = "nan_as_null")]
    pub avg_fitness: f64,
    #[serde(with = "nan_as_null")]
    pub worst_fitness: f64,
    /// Standard deviation of the finite fitness values
    #[serde(with = "nan_as_null")]
    pub diversity: f64,
    pub total_evaluated: u64,
    /// Individuals whose fitness came back NaN
    pub nan_count: usize,
}

impl GenerationStats {
    pub fn from_scores(generation: usize, scores: &[f64], total_evaluated: u64) -> Self {
        let finite: Vec<f64> = scores.iter().copied().filter(|f| !f.is_nan()).collect();
        let nan_count = scores.len() - finite.len();

        if finite.is_empty() {
            return Self {
                generation,
                best_fitness: f64::NAN,
                avg_fitness: f64::NAN,
                worst_fitness: f64::NAN,
                diversity: 0.0,
                total_evaluated,
                nan_count,
            };
        }

        let best = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let worst = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let avg = finite.iter().sum::<f64>() / finite.len() as f64;
        let variance = finite.iter().map(|f| (f - avg).powi(2)).sum::<f64>() / finite.len() as f64;

        Self {
            generation,
            best_fitness: best,
            avg_fitness: avg,
            worst_fitness: worst,
            diversity: variance.sqrt(),
            total_evaluated,
            nan_count,
        }
    }
}

/// Final result of an optimizer run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub best: Vec<f64>,
    #[serde(with = "nan_as_null")]
    pub fitness: f64,
    pub generations: usize,
    pub evaluations: u64,
    /// Hill-climber restarts; zero for population methods
    pub restarts: usize,
    #[serde(default)]
    pub history: Vec<GenerationStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_ignore_nan() {
        let stats = GenerationStats::from_scores(3, &[1.0, f64::NAN, 3.0], 12);
        assert_eq!(stats.best_fitness, 3.0);
        assert_eq!(stats.worst_fitness, 1.0);
        assert_eq!(stats.avg_fitness, 2.0);
        assert!((stats.diversity - 1.0).abs() < 1e-12);
        assert_eq!(stats.nan_count, 1);
        assert_eq!(stats.total_evaluated, 12);
    }

    #[test]
    fn test_stats_all_nan() {
        let stats = GenerationStats::from_scores(0, &[f64::NAN, f64::NAN], 2);
        assert!(stats.best_fitness.is_nan());
        assert_eq!(stats.nan_count, 2);
    }

    #[test]
    fn test_nan_fitness_survives_json() {
        let outcome = RunOutcome {
            best: vec![0.5, 0.25],
            fitness: f64::NAN,
            generations: 1,
            evaluations: 2,
            restarts: 0,
            history: vec![GenerationStats::from_scores(0, &[f64::NAN, f64::NAN], 2)],
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"fitness\":null"));

        let loaded: RunOutcome = serde_json::from_str(&json).unwrap();
        assert!(loaded.fitness.is_nan());
        assert!(loaded.history[0].best_fitness.is_nan());
        assert!(loaded.history[0].avg_fitness.is_nan());
        assert!(loaded.history[0].worst_fitness.is_nan());
        assert_eq!(loaded.history[0].nan_count, 2);
        assert_eq!(loaded.best, outcome.best);
    }

    #[test]
    fn test_finite_fitness_is_a_plain_number() {
        let stats = GenerationStats::from_scores(4, &[1.5, 2.5], 8);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"best_fitness\":2.5"));
        let loaded: GenerationStats = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.best_fitness, 2.5);
        assert_eq!(loaded.worst_fitness, 1.5);
    }
}
