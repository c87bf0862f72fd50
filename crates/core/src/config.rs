//! Configuration structures for the parking pricing system.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ModelKind, VehicleType};

/// Main configuration for the pricing engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared pricing parameters.
    pub pricing: PricingConfig,
    /// Baseline model configuration.
    pub baseline: BaselineConfig,
    /// Demand-based model configuration.
    pub demand: DemandConfig,
    /// Competitive model configuration.
    pub competitive: CompetitiveConfig,
    /// Price stabilizer configuration.
    pub stabilizer: StabilizerConfig,
    /// Streaming orchestrator configuration.
    pub engine: EngineConfig,
}

impl Config {
    /// Parse a TOML document. Missing sections and fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check option ranges. Any failure is fatal for a run.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pricing;
        let s = &self.stabilizer;

        if !(p.base_price.is_finite() && p.base_price > 0.0) {
            return Err(Error::config("pricing.base_price must be positive"));
        }
        if !(0.0..=1.0).contains(&p.target_occupancy_rate) {
            return Err(Error::config("pricing.target_occupancy_rate must lie in [0, 1]"));
        }
        if p.history_limit == Some(0) {
            return Err(Error::config("pricing.history_limit must be at least 1"));
        }

        if !self.baseline.alpha.is_finite() || self.baseline.alpha < 0.0 {
            return Err(Error::config("baseline.alpha must be non-negative"));
        }

        let d = &self.demand;
        if [d.weights.w1, d.weights.w2, d.weights.w3, d.weights.w4, d.weights.w5]
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(Error::config("demand weights w1..w5 must be non-negative"));
        }
        if !d.lambda.is_finite() || d.lambda < 0.0 {
            return Err(Error::config("demand.lambda must be non-negative"));
        }
        if d.queue_saturation <= 0.0 {
            return Err(Error::config("demand.queue_saturation must be positive"));
        }
        if !(d.min_multiplier > 0.0 && d.min_multiplier <= 1.0 && d.max_multiplier >= 1.0) {
            return Err(Error::config(
                "demand multipliers must satisfy 0 < min_multiplier <= 1 <= max_multiplier",
            ));
        }
        let vw = &d.vehicle_weights;
        if [vw.car, vw.bike, vw.truck, vw.other].iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::config("demand.vehicle_weights must be non-negative"));
        }

        let c = &self.competitive;
        if !(c.competitor_radius_km.is_finite() && c.competitor_radius_km > 0.0) {
            return Err(Error::config("competitive.competitor_radius_km must be positive"));
        }
        if !(0.0..=1.0).contains(&c.competitive_shift_factor) {
            return Err(Error::config("competitive.competitive_shift_factor must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&c.high_occupancy_threshold) {
            return Err(Error::config("competitive.high_occupancy_threshold must lie in [0, 1]"));
        }
        if c.price_gap_tolerance < 0.0 {
            return Err(Error::config("competitive.price_gap_tolerance must be non-negative"));
        }

        if !(s.min_price.is_finite() && s.min_price > 0.0) {
            return Err(Error::config("stabilizer.min_price must be positive"));
        }
        if let Some(max_price) = s.max_price {
            if max_price < s.min_price {
                return Err(Error::config("stabilizer.max_price must not be below min_price"));
            }
            if p.base_price > max_price {
                return Err(Error::config("pricing.base_price exceeds stabilizer.max_price"));
            }
        }
        if p.base_price < s.min_price {
            return Err(Error::config("pricing.base_price is below stabilizer.min_price"));
        }
        if !(s.max_step > 0.0 && s.max_step < 1.0) {
            return Err(Error::config("stabilizer.max_step must lie in (0, 1)"));
        }
        if s.precision > 8 {
            return Err(Error::config("stabilizer.precision must be at most 8 decimal places"));
        }

        if self.engine.active_models.is_empty() {
            return Err(Error::config("engine.active_models must name at least one model"));
        }
        if self.engine.flush_every == 0 {
            return Err(Error::config("engine.flush_every must be at least 1"));
        }

        Ok(())
    }
}

/// Parameters shared by every model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Starting price for every lot.
    pub base_price: f64,
    /// Occupancy rate at which the baseline model holds its price.
    pub target_occupancy_rate: f64,
    /// Maximum history points kept per lot (None = unbounded).
    pub history_limit: Option<usize>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price: 10.0,
            target_occupancy_rate: 0.5,
            history_limit: None,
        }
    }
}

/// Baseline linear model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Price change per unit of occupancy deviation.
    pub alpha: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

/// Demand score weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandWeights {
    /// Occupancy rate weight.
    pub w1: f64,
    /// Normalized queue length weight.
    pub w2: f64,
    /// Traffic penalty weight (subtracted).
    pub w3: f64,
    /// Special day bonus weight.
    pub w4: f64,
    /// Vehicle weight factor.
    pub w5: f64,
}

impl Default for DemandWeights {
    fn default() -> Self {
        Self {
            w1: 0.6,
            w2: 0.3,
            w3: 0.2,
            w4: 0.4,
            w5: 0.1,
        }
    }
}

/// Per-vehicle-type demand multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleWeights {
    pub car: f64,
    pub bike: f64,
    pub truck: f64,
    pub other: f64,
}

impl VehicleWeights {
    /// Weight for a vehicle type; unrecognized types have none.
    pub fn weight(&self, vehicle: &VehicleType) -> Option<f64> {
        match vehicle {
            VehicleType::Car => Some(self.car),
            VehicleType::Bike => Some(self.bike),
            VehicleType::Truck => Some(self.truck),
            VehicleType::Other => Some(self.other),
            VehicleType::Unrecognized(_) => None,
        }
    }
}

impl Default for VehicleWeights {
    fn default() -> Self {
        Self {
            car: 1.0,
            bike: 0.5,
            truck: 1.5,
            other: 1.0,
        }
    }
}

/// Demand-based model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandConfig {
    pub weights: DemandWeights,
    /// Scale applied to the clipped demand score.
    pub lambda: f64,
    /// Queue length at which the normalized queue term saturates.
    pub queue_saturation: f64,
    /// Lower bound of the candidate as a multiple of base price.
    pub min_multiplier: f64,
    /// Upper bound of the candidate as a multiple of base price.
    pub max_multiplier: f64,
    pub vehicle_weights: VehicleWeights,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            weights: DemandWeights::default(),
            lambda: 0.8,
            queue_saturation: 20.0,
            min_multiplier: 0.5,
            max_multiplier: 2.0,
            vehicle_weights: VehicleWeights::default(),
        }
    }
}

/// Competitive model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitiveConfig {
    /// Neighbor search radius (great-circle distance).
    pub competitor_radius_km: f64,
    /// Fraction of the gap to the competitor average that is closed.
    pub competitive_shift_factor: f64,
    /// Own occupancy rate at or above which lower competitor prices pull the price down.
    pub high_occupancy_threshold: f64,
    /// Relative gap below which competitor prices are not "meaningfully" lower.
    pub price_gap_tolerance: f64,
    /// Maximum rerouting suggestions per full-lot event.
    pub reroute_limit: usize,
    /// Neighbors priced at most this multiple of the own price are suggested.
    pub reroute_price_tolerance: f64,
}

impl Default for CompetitiveConfig {
    fn default() -> Self {
        Self {
            competitor_radius_km: 0.555,
            competitive_shift_factor: 0.3,
            high_occupancy_threshold: 0.9,
            price_gap_tolerance: 0.05,
            reroute_limit: 3,
            reroute_price_tolerance: 1.1,
        }
    }
}

/// Price stabilizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Absolute price floor.
    pub min_price: f64,
    /// Optional absolute price ceiling.
    pub max_price: Option<f64>,
    /// Maximum relative change between consecutive prices.
    pub max_step: f64,
    /// Currency precision in decimal places.
    pub precision: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            min_price: 5.0,
            max_price: Some(20.0),
            max_step: 0.1,
            precision: 2,
        }
    }
}

/// Order in which the orchestrator replays observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayOrdering {
    /// Buffer the replay and sort by (timestamp, lot_id).
    Timestamp,
    /// Process in arrival order; per-lot regressions are ordering violations.
    Arrival,
}

/// Streaming orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Models evaluated for every observation.
    pub active_models: Vec<ModelKind>,
    pub ordering: ReplayOrdering,
    /// Events buffered before a flush to the sink.
    pub flush_every: usize,
    /// Only replay the first N records.
    pub max_observations: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            active_models: ModelKind::ALL.to_vec(),
            ordering: ReplayOrdering::Timestamp,
            flush_every: 256,
            max_observations: None,
        }
    }
}
