//! Various numeric helper functions shared by the retina pipeline and the
//! connectivity engine.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Samples source indices from the distribution defined by `bins`. The vector
/// does not have to add up to one, it is normalized internally.
///
/// Returns an empty vector when `bins` is empty or carries no positive mass,
/// in which case there is nothing to sample from.
pub fn sample_from_bin_distribution<R: Rng>(
    bins: &[f64],
    num_samples: usize,
    rng: &mut R,
) -> Vec<usize> {
    if bins.is_empty() || num_samples == 0 {
        return vec![];
    }

    match WeightedIndex::new(bins) {
        Ok(dist) => (0..num_samples).map(|_| dist.sample(rng)).collect(),
        // All-zero (or otherwise degenerate) weights carry no mass.
        Err(_) => vec![],
    }
}

/// Returns the value of the probability density of N(mean, sigma) at `x`.
pub fn normal_function(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    (-z * z / 2.0).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// Discrete convolution of `a` with `v`, truncated to the length of `a` and
/// centered ("same" mode): element i of the result is
/// `sum_j a[i + offset - j] * v[j]` with `offset = (len(v) - 1) / 2`.
pub fn convolve_same(a: &[f64], v: &[f64]) -> Vec<f64> {
    if a.is_empty() || v.is_empty() {
        return a.to_vec();
    }
    let offset = (v.len() - 1) / 2;
    (0..a.len())
        .map(|i| {
            let mut acc = 0.0;
            for (j, &vj) in v.iter().enumerate() {
                let k = i + offset;
                if k >= j && k - j < a.len() {
                    acc += a[k - j] * vj;
                }
            }
            acc
        })
        .collect()
}
