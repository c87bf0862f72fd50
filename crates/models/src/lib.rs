//! Pricing models for the parking pricing system.
//!
//! This crate handles:
//! - Baseline linear pricing
//! - Demand-based pricing (weighted, saturated demand score)
//! - Competitive pricing (haversine neighbor lookup, rerouting)
//! - Price stabilization (floor, step limit, rounding)

pub mod baseline;
pub mod competitive;
pub mod context;
pub mod demand;
pub mod geo;
pub mod model;
pub mod stabilizer;

pub use baseline::BaselineModel;
pub use competitive::CompetitiveModel;
pub use context::{Neighbor, PricingContext};
pub use demand::{DemandModel, DemandScore};
pub use geo::haversine_km;
pub use model::PricingModel;
pub use stabilizer::{PriceStabilizer, Stabilized};
