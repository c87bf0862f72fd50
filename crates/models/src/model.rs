//! Model dispatch.
//!
//! The three pricing policies form a closed set selected by configuration.

use parking_core::{Config, ModelKind, Reroute, Result};

use crate::baseline::BaselineModel;
use crate::competitive::CompetitiveModel;
use crate::context::PricingContext;
use crate::demand::DemandModel;

/// One of the configured pricing policies.
#[derive(Debug, Clone)]
pub enum PricingModel {
    Baseline(BaselineModel),
    Demand(DemandModel),
    Competitive(CompetitiveModel),
}

impl PricingModel {
    /// Build the model for `kind` from configuration.
    pub fn from_config(kind: ModelKind, config: &Config) -> Self {
        match kind {
            ModelKind::Baseline => PricingModel::Baseline(BaselineModel::from_config(config)),
            ModelKind::Demand => PricingModel::Demand(DemandModel::from_config(config)),
            ModelKind::Competitive => {
                PricingModel::Competitive(CompetitiveModel::from_config(config))
            }
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            PricingModel::Baseline(_) => ModelKind::Baseline,
            PricingModel::Demand(_) => ModelKind::Demand,
            PricingModel::Competitive(_) => ModelKind::Competitive,
        }
    }

    /// Neighbor search radius, for models that read other lots.
    pub fn neighbor_radius_km(&self) -> Option<f64> {
        match self {
            PricingModel::Competitive(m) => Some(m.radius_km()),
            _ => None,
        }
    }

    /// Candidate price for the observation in `ctx`.
    ///
    /// The candidate is unbounded; it may be non-finite, which the stabilizer
    /// reports as a computation overflow.
    pub fn evaluate(&self, ctx: &PricingContext<'_>) -> Result<f64> {
        match self {
            PricingModel::Baseline(m) => Ok(m.price(ctx)),
            PricingModel::Demand(m) => m.price(ctx),
            PricingModel::Competitive(m) => m.price(ctx),
        }
    }

    /// Rerouting suggestions for a stabilized price. Empty for models
    /// without competition awareness.
    pub fn reroutes(&self, ctx: &PricingContext<'_>, final_price: f64) -> Vec<Reroute> {
        match self {
            PricingModel::Competitive(m) => {
                m.suggest_rerouting(ctx.reading, final_price, ctx.neighbors)
            }
            _ => Vec::new(),
        }
    }
}
