//! Demand-based model.
//!
//! Scores demand as a weighted sum of occupancy, queue pressure, traffic,
//! special days and vehicle mix, saturates the score to [-1, 1] and scales the
//! base price by `1 + lambda * score`.

use parking_core::{Config, DemandConfig, Error, Result};
use serde::Serialize;

use crate::context::PricingContext;

/// Demand score before and after saturation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DemandScore {
    pub raw: f64,
    /// `raw` clipped to [-1, 1].
    pub clipped: f64,
}

/// Weighted-demand pricing around a fixed base price.
#[derive(Debug, Clone)]
pub struct DemandModel {
    base_price: f64,
    config: DemandConfig,
}

impl DemandModel {
    pub fn new(base_price: f64, config: DemandConfig) -> Self {
        Self { base_price, config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.pricing.base_price, config.demand.clone())
    }

    /// Candidate bounds `[min_multiplier * base, max_multiplier * base]`.
    pub fn band(&self) -> (f64, f64) {
        (
            self.base_price * self.config.min_multiplier,
            self.base_price * self.config.max_multiplier,
        )
    }

    /// Queue length scaled to [0, 1].
    pub fn queue_norm(&self, queue_length: i64) -> Result<f64> {
        if queue_length < 0 {
            return Err(Error::validation(format!("negative queue_length {}", queue_length)));
        }
        Ok((queue_length as f64 / self.config.queue_saturation).min(1.0))
    }

    /// Weighted demand score for an observation.
    pub fn score(&self, ctx: &PricingContext<'_>) -> Result<DemandScore> {
        let obs = ctx.observation;
        let w = &self.config.weights;

        let vehicle_weight = self
            .config
            .vehicle_weights
            .weight(&obs.vehicle_type)
            .ok_or_else(|| {
                Error::validation(format!("unknown vehicle_type '{}'", obs.vehicle_type.as_str()))
            })?;
        let queue = self.queue_norm(obs.queue_length)?;
        let special = if obs.is_special_day { 1.0 } else { 0.0 };

        let raw = w.w1 * ctx.occupancy_rate() + w.w2 * queue - w.w3 * obs.traffic_level.penalty()
            + w.w4 * special
            + w.w5 * vehicle_weight;

        Ok(DemandScore {
            raw,
            clipped: saturate(raw),
        })
    }

    /// Price for an already-saturated score, bounded to the band.
    pub fn price_for_score(&self, clipped: f64) -> f64 {
        let (lo, hi) = self.band();
        let price = self.base_price * (1.0 + self.config.lambda * clipped);
        if price.is_finite() {
            price.clamp(lo, hi)
        } else {
            price
        }
    }

    pub fn price(&self, ctx: &PricingContext<'_>) -> Result<f64> {
        let score = self.score(ctx)?;
        Ok(self.price_for_score(score.clipped))
    }
}

/// Clip to [-1, 1]; NaN stays NaN so the stabilizer can flag it.
#[inline]
fn saturate(raw: f64) -> f64 {
    if raw.is_nan() {
        raw
    } else {
        raw.clamp(-1.0, 1.0)
    }
}
