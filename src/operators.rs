//! Variation and selection operators on bounded real vectors.

use rand::seq::index;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::fitness::{compare_fitness, Individual};
use crate::limits::Limits;

/// Parents closer than this are left untouched by SBX
const SBX_EPSILON: f64 = 1e-14;

/// Gaussian mutation of every gene, clamped back into the limits.
///
/// The step for gene `i` is `(hi_i - lo_i) / 6 / sqrt(n)`, so a full-width
/// interval is roughly six sigma and the total step length does not grow
/// with dimension.
pub fn gaussian_mutation<R: Rng + ?Sized>(genome: &mut [f64], limits: &Limits, rng: &mut R) {
    let scale = (genome.len() as f64).sqrt();
    for (i, gene) in genome.iter_mut().enumerate() {
        let sigma = limits.width(i) / 6.0 / scale;
        let mutated = match Normal::new(*gene, sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => *gene,
        };
        *gene = limits.clamp(i, mutated);
        debug_assert!(*gene >= limits.lower(i) && *gene <= limits.upper(i));
    }
}

/// Simulated binary crossover bounded to the limits, applied in place.
///
/// `eta` is the crowding degree: large values keep children near their
/// parents. Each gene crosses with probability one half.
pub fn sbx_crossover_bounded<R: Rng + ?Sized>(
    a: &mut [f64],
    b: &mut [f64],
    eta: f64,
    limits: &Limits,
    rng: &mut R,
) {
    let size = a.len().min(b.len()).min(limits.dim());
    let exponent = 1.0 / (eta + 1.0);

    for i in 0..size {
        if rng.gen::<f64>() > 0.5 {
            continue;
        }
        if (a[i] - b[i]).abs() <= SBX_EPSILON {
            continue;
        }

        let (xl, xu) = (limits.lower(i), limits.upper(i));
        let x1 = a[i].min(b[i]);
        let x2 = a[i].max(b[i]);
        let u: f64 = rng.gen();

        let spread = |beta: f64| -> f64 {
            let alpha = 2.0 - beta.powf(-(eta + 1.0));
            if u <= 1.0 / alpha {
                (u * alpha).powf(exponent)
            } else {
                (1.0 / (2.0 - u * alpha)).powf(exponent)
            }
        };

        let beta_q = spread(1.0 + 2.0 * (x1 - xl) / (x2 - x1));
        let c1 = 0.5 * (x1 + x2 - beta_q * (x2 - x1));

        let beta_q = spread(1.0 + 2.0 * (xu - x2) / (x2 - x1));
        let c2 = 0.5 * (x1 + x2 + beta_q * (x2 - x1));

        let c1 = c1.clamp(xl, xu);
        let c2 = c2.clamp(xl, xu);

        if rng.gen::<f64>() <= 0.5 {
            a[i] = c2;
            b[i] = c1;
        } else {
            a[i] = c1;
            b[i] = c2;
        }
    }
}

/// `k` tournaments of `size` contestants drawn with replacement.
/// Returns the index of each tournament's winner.
pub fn tournament<R: Rng + ?Sized>(
    population: &[Individual],
    k: usize,
    size: usize,
    rng: &mut R,
) -> Vec<usize> {
    if population.is_empty() {
        return Vec::new();
    }
    (0..k)
        .map(|_| {
            let mut best_idx = rng.gen_range(0..population.len());
            for _ in 1..size.max(1) {
                let idx = rng.gen_range(0..population.len());
                if compare_fitness(population[idx].score(), population[best_idx].score()).is_gt() {
                    best_idx = idx;
                }
            }
            best_idx
        })
        .collect()
}

/// Indices of the `k` fittest individuals, best first.
/// The sort is stable, so earlier individuals win ties.
pub fn select_best(population: &[Individual], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| compare_fitness(population[b].score(), population[a].score()));
    order.truncate(k);
    order
}

/// `k` distinct indices into a population of `len`
pub fn sample_without_replacement<R: Rng + ?Sized>(len: usize, k: usize, rng: &mut R) -> Vec<usize> {
    index::sample(rng, len, k.min(len)).into_vec()
}
