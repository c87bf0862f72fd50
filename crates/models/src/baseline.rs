//! Baseline linear model.
//!
//! Moves the previous price by `alpha` times the deviation of the occupancy
//! rate from its target.

use parking_core::Config;

use crate::context::PricingContext;

/// Linear occupancy-driven price adjustment.
#[derive(Debug, Clone)]
pub struct BaselineModel {
    alpha: f64,
    target_occupancy_rate: f64,
}

impl BaselineModel {
    pub fn new(alpha: f64, target_occupancy_rate: f64) -> Self {
        Self {
            alpha,
            target_occupancy_rate,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.baseline.alpha, config.pricing.target_occupancy_rate)
    }

    /// `last_price + alpha * (rate - target)`.
    #[inline]
    pub fn candidate(&self, last_price: f64, occupancy_rate: f64) -> f64 {
        last_price + self.alpha * (occupancy_rate - self.target_occupancy_rate)
    }

    pub fn price(&self, ctx: &PricingContext<'_>) -> f64 {
        self.candidate(ctx.state.last_price, ctx.occupancy_rate())
    }
}
