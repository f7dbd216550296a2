//! Weighted discrete draws used to pick items and destination blocks.

use rand::Rng;
use rv::misc::pflip;

/// Draw an index with probability proportional to its weight.
///
/// Callers must pass a non-empty slice of finite, non-negative weights with a
/// positive sum; the sampler is never asked to resolve a zero-sum vector.
pub trait WeightedChoice {
    fn draw_index<R: Rng>(&mut self, weights: &[f64], rng: &mut R) -> usize;
}

/// Inverse-CDF draws via `rv`'s `pflip`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pflip;

impl WeightedChoice for Pflip {
    fn draw_index<R: Rng>(&mut self, weights: &[f64], rng: &mut R) -> usize {
        pflip(weights, None, rng)
    }
}
