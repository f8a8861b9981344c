//! Collision-avoidance gate
//!
//! Several independent agents may watch the same canvas region. In
//! collect-all mode each loop only acts with probability `p(n)`, where `n`
//! is the number of wrong pixels, so that a lone wrong pixel is not claimed
//! by every agent in the same cycle.
//!
//! `p(n) = 1 - m^n` with per-pixel miss rate `m` (default 0.75): one wrong
//! pixel gives 1/4, and the odds climb toward 1 as more of the region is
//! wrong.

use serde::{Deserialize, Serialize};

/// Default per-pixel miss rate
pub const DEFAULT_MISS_RATE: f64 = 0.75;

/// Probabilistic gate in front of collect-all placements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionGate {
    /// When false every non-empty pass acts
    pub enabled: bool,
    /// Probability that a single wrong pixel does not trigger action
    pub miss_rate: f64,
}

impl CollisionGate {
    /// Gate with the given miss rate, clamped to `[0, 1]`
    #[inline]
    #[must_use]
    pub fn new(miss_rate: f64) -> Self {
        Self {
            enabled: true,
            miss_rate: miss_rate.clamp(0.0, 1.0),
        }
    }

    /// Gate that always admits
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            miss_rate: DEFAULT_MISS_RATE,
        }
    }

    /// Probability of acting with `wrong` pixels outstanding
    #[must_use]
    pub fn probability(&self, wrong: usize) -> f64 {
        if wrong == 0 {
            return 0.0;
        }
        if !self.enabled {
            return 1.0;
        }
        let exponent = i32::try_from(wrong).unwrap_or(i32::MAX);
        1.0 - self.miss_rate.clamp(0.0, 1.0).powi(exponent)
    }

    /// Whether a uniform draw in `[0, 1)` passes the gate
    #[inline]
    #[must_use]
    pub fn admits(&self, wrong: usize, draw: f64) -> bool {
        draw < self.probability(wrong)
    }
}

impl Default for CollisionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MISS_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn single_wrong_pixel_floor() {
        let gate = CollisionGate::default();
        assert!((gate.probability(1) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn nothing_wrong_never_admits() {
        assert!(!CollisionGate::default().admits(0, 0.0));
        assert!(!CollisionGate::disabled().admits(0, 0.0));
    }

    #[test]
    fn disabled_gate_always_admits() {
        let gate = CollisionGate::disabled();
        assert!(gate.admits(1, 0.999_999));
    }

    #[test]
    fn many_wrong_pixels_approach_certainty() {
        let gate = CollisionGate::default();
        assert!(gate.probability(50) > 0.999);
        assert!(gate.probability(usize::MAX) <= 1.0);
    }

    #[test]
    fn observed_rate_matches_probability() {
        let gate = CollisionGate::default();
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 20_000;
        let admitted = (0..trials).filter(|_| gate.admits(1, rng.random::<f64>())).count();

        let rate = admitted as f64 / f64::from(trials);
        assert!((rate - 0.25).abs() < 0.02, "observed rate {rate}");
    }

    #[test]
    fn miss_rate_is_clamped() {
        assert_eq!(CollisionGate::new(3.0).miss_rate, 1.0);
        assert_eq!(CollisionGate::new(-1.0).miss_rate, 0.0);
    }

    proptest! {
        #[test]
        fn prop_probability_is_monotonic(n in 1usize..500, miss in 0.0f64..1.0) {
            let gate = CollisionGate::new(miss);
            prop_assert!(gate.probability(n + 1) >= gate.probability(n));
            prop_assert!((0.0..=1.0).contains(&gate.probability(n)));
        }
    }
}
