//! Price stabilization.
//!
//! Every candidate is bounded before commit:
//! - floor at `min_price` (and ceiling at `max_price` when configured)
//! - at most `max_step` relative change from the prior price
//! - rounded to the currency precision without leaving those bounds
//!
//! Out-of-range candidates are clamped, never rejected.

use parking_core::{Config, StabilizerConfig};
use tracing::debug;

/// Result of stabilizing one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stabilized {
    /// Final price to commit.
    pub price: f64,
    /// Candidate was non-finite or non-positive and replaced by `min_price`.
    pub overflow: bool,
    /// The step limit bound the result.
    pub step_limited: bool,
    /// The absolute floor or ceiling bound the result.
    pub bounded: bool,
}

/// Clamps and rounds candidate prices.
#[derive(Debug, Clone)]
pub struct PriceStabilizer {
    config: StabilizerConfig,
    scale: f64,
}

impl PriceStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        let scale = 10f64.powi(config.precision as i32);
        Self { config, scale }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stabilizer.clone())
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Bound `candidate` against the prior committed price.
    ///
    /// `prior` is expected to lie within `[min_price, max_price]`, which holds
    /// for every committed price and for a validated base price.
    pub fn stabilize(&self, candidate: f64, prior: f64) -> Stabilized {
        let min_price = self.config.min_price;
        let max_price = self.config.max_price.unwrap_or(f64::INFINITY);

        let overflow = !candidate.is_finite() || candidate <= 0.0;
        let candidate = if overflow {
            debug!(candidate, min_price, "non-positive or non-finite candidate");
            min_price
        } else {
            candidate
        };

        let step_lo = prior * (1.0 - self.config.max_step);
        let step_hi = prior * (1.0 + self.config.max_step);
        let lo = step_lo.max(min_price);
        let hi = step_hi.min(max_price);

        let clamped = candidate.clamp(lo, hi.max(lo));
        let step_limited = candidate < step_lo || candidate > step_hi;
        let bounded = candidate < min_price || candidate > max_price;

        Stabilized {
            price: self.round_within(clamped, lo, hi.max(lo)),
            overflow,
            step_limited,
            bounded,
        }
    }

    /// Round to precision, falling back toward the interior when nearest
    /// rounding would leave `[lo, hi]`.
    fn round_within(&self, value: f64, lo: f64, hi: f64) -> f64 {
        let nearest = (value * self.scale).round() / self.scale;
        if nearest >= lo && nearest <= hi {
            return nearest;
        }
        let inward = if nearest > hi {
            (value * self.scale).floor() / self.scale
        } else {
            (value * self.scale).ceil() / self.scale
        };
        if inward >= lo && inward <= hi {
            inward
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stabilizer() -> PriceStabilizer {
        PriceStabilizer::new(StabilizerConfig::default())
    }

    #[test]
    fn test_within_bounds_passes_through() {
        let s = stabilizer().stabilize(10.37, 10.0);
        assert_relative_eq!(s.price, 10.37);
        assert!(!s.step_limited && !s.overflow && !s.bounded);
    }

    #[test]
    fn test_step_limit_up_and_down() {
        let up = stabilizer().stabilize(19.0, 10.0);
        assert_relative_eq!(up.price, 11.0);
        assert!(up.step_limited);

        let down = stabilizer().stabilize(6.0, 10.0);
        assert_relative_eq!(down.price, 9.0);
        assert!(down.step_limited);
    }

    #[test]
    fn test_floor() {
        let s = stabilizer().stabilize(1.0, 5.2);
        assert_relative_eq!(s.price, 5.0);
        assert!(s.price >= 5.0);
        assert!(s.bounded);
    }

    #[test]
    fn test_ceiling() {
        let s = stabilizer().stabilize(25.0, 19.5);
        assert_relative_eq!(s.price, 20.0);
    }

    #[test]
    fn test_overflow_goes_to_floor() {
        for bad in [f64::NAN, f64::INFINITY, -3.0, 0.0] {
            let s = stabilizer().stabilize(bad, 5.0);
            assert!(s.overflow);
            assert_relative_eq!(s.price, 5.0);
        }
    }

    #[test]
    fn test_overflow_still_step_limited() {
        let s = stabilizer().stabilize(f64::NAN, 10.0);
        assert!(s.overflow);
        assert_relative_eq!(s.price, 9.0);
    }

    #[test]
    fn test_rounding_never_breaks_step() {
        let stabilizer = stabilizer();
        let prior = 10.123;
        let s = stabilizer.stabilize(50.0, prior);
        // 10.123 * 1.1 = 11.1353; nearest rounding would give 11.14
        assert_relative_eq!(s.price, 11.13);
        assert!((s.price - prior).abs() / prior <= 0.1 + 1e-12);
    }

    #[test]
    fn test_step_invariant_over_walk() {
        let stabilizer = stabilizer();
        let mut prior = 10.0;
        let candidates = [30.0, 0.5, 12.7, f64::NAN, 19.9, 4.0, 8.88, 1e9, 5.01];
        for candidate in candidates {
            let s = stabilizer.stabilize(candidate, prior);
            assert!(s.price >= 5.0);
            assert!(s.price <= 20.0);
            assert!((s.price - prior).abs() / prior <= 0.1 + 1e-12);
            prior = s.price;
        }
    }
}
