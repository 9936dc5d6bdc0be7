// SPDX-License-Identifier: Apache-2.0
//! Weighted selection for Router sampling (spec §4.3).
//!
//! The PRNG source is treated as an externally injected dependency
//! (`&mut dyn RngCore`) so tests can pin a seeded generator — the core never
//! constructs its own source of randomness.
use rand::RngCore;

/// Samples one index weighted by `weights`, or `None` when there is nothing
/// to select.
///
/// Given non-negative weights `w_0..w_{n-1}`: if `n == 0` or `sum(w) == 0`,
/// returns `None`. Otherwise draws `u` uniformly from `[0, sum(w))` and
/// returns the smallest `i` such that the prefix sum through `i` exceeds `u`.
///
/// # Panics
///
/// Never panics on negative weights in release builds' arithmetic, but
/// callers must uphold the spec invariant that weights are non-negative;
/// violating it yields an unspecified (not wrong-typed) result.
#[must_use]
pub fn weighted_select(weights: &[f64], rng: &mut dyn RngCore) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }
    // rng.next_u64() / 2^64 ∈ [0, 1); scale into [0, total).
    let u = (rng.next_u64() as f64 / (u64::MAX as f64 + 1.0)) * total;
    let mut running = 0.0;
    for (i, w) in weights.iter().enumerate() {
        running += *w;
        if running > u {
            return Some(i);
        }
    }
    // Floating-point rounding can leave `running` a hair below `total`;
    // fall back to the last non-zero-weight index (tie-break rule in spec).
    weights.iter().rposition(|w| *w > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn empty_weights_select_none() {
        let mut rng = StepRng::new(0, 1);
        assert_eq!(weighted_select(&[], &mut rng), None);
    }

    #[test]
    fn all_zero_weights_select_none() {
        let mut rng = StepRng::new(0, 1);
        assert_eq!(weighted_select(&[0.0, 0.0, 0.0], &mut rng), None);
    }

    #[test]
    fn zero_weight_outputs_are_never_chosen() {
        let mut rng = StepRng::new(0, u64::MAX / 5);
        for _ in 0..50 {
            let choice = weighted_select(&[0.0, 1.0, 0.0, 1.0], &mut rng);
            assert!(matches!(choice, Some(1) | Some(3)));
        }
    }

    #[test]
    fn single_positive_weight_always_wins() {
        let mut rng = StepRng::new(u64::MAX / 2, 12345);
        for _ in 0..10 {
            assert_eq!(weighted_select(&[0.0, 0.0, 5.0], &mut rng), Some(2));
        }
    }
}
