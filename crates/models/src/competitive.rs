//! Competitive model.
//!
//! Starts from the demand-based candidate and nudges it toward the average
//! committed price of lots within the competitive radius. A busy lot whose
//! neighbors are meaningfully cheaper is pulled down so drivers are steered
//! elsewhere; a lot whose neighbors are dearer may rise toward them. Both
//! moves stay inside the demand band.

use parking_core::{CompetitiveConfig, Config, OccupancyReading, Reroute, Result};
use tracing::trace;

use crate::context::{Neighbor, PricingContext};
use crate::demand::DemandModel;

/// Demand pricing adjusted for nearby competition.
#[derive(Debug, Clone)]
pub struct CompetitiveModel {
    demand: DemandModel,
    config: CompetitiveConfig,
}

impl CompetitiveModel {
    pub fn new(demand: DemandModel, config: CompetitiveConfig) -> Self {
        Self { demand, config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(DemandModel::from_config(config), config.competitive.clone())
    }

    /// Neighbor search radius.
    pub fn radius_km(&self) -> f64 {
        self.config.competitor_radius_km
    }

    pub fn price(&self, ctx: &PricingContext<'_>) -> Result<f64> {
        let candidate = self.demand.price(ctx)?;
        Ok(self.adjust(candidate, ctx.occupancy_rate(), ctx.competitor_avg()))
    }

    /// Move a demand candidate toward the competitor average.
    pub fn adjust(&self, candidate: f64, occupancy_rate: f64, competitor_avg: Option<f64>) -> f64 {
        let Some(avg) = competitor_avg else {
            return candidate;
        };
        if !candidate.is_finite() {
            return candidate;
        }

        let shift = self.config.competitive_shift_factor;
        let cheaper_nearby = avg < candidate * (1.0 - self.config.price_gap_tolerance);
        let busy = occupancy_rate >= self.config.high_occupancy_threshold;

        let adjusted = if cheaper_nearby && busy {
            candidate - shift * (candidate - avg)
        } else if avg > candidate {
            candidate + shift * (avg - candidate)
        } else {
            candidate
        };

        let (lo, hi) = self.demand.band();
        let bounded = adjusted.clamp(lo, hi);
        trace!(candidate, avg, bounded, "competitive adjustment");
        bounded
    }

    /// Cheaper nearby lots to offer when this lot is full.
    ///
    /// Neighbors priced within `reroute_price_tolerance` of `own_price` are
    /// listed nearest first, up to `reroute_limit`.
    pub fn suggest_rerouting(
        &self,
        reading: &OccupancyReading,
        own_price: f64,
        neighbors: &[Neighbor],
    ) -> Vec<Reroute> {
        if !reading.is_full() {
            return Vec::new();
        }

        let ceiling = own_price * self.config.reroute_price_tolerance;
        neighbors
            .iter()
            .filter(|n| n.price <= ceiling)
            .take(self.config.reroute_limit)
            .map(|n| Reroute {
                lot_id: n.lot_id.clone(),
                distance_km: n.distance_km,
                price: n.price,
                savings: own_price - n.price,
            })
            .collect()
    }
}
