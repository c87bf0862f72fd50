//! Core data types for the parking pricing system.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Parking lot identifier.
pub type LotId = String;

/// Convert a naive (local, zone-less) date-time to a millisecond timestamp.
#[inline]
pub fn naive_to_ms(dt: NaiveDateTime) -> TimestampMs {
    dt.and_utc().timestamp_millis()
}

/// Render a millisecond timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_ts(ts_ms: TimestampMs) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ts_ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts_ms.to_string(),
    }
}

/// Traffic condition near the lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
}

impl TrafficLevel {
    /// Demand penalty in [0, 1]; grows with congestion.
    #[inline]
    pub fn penalty(self) -> f64 {
        match self {
            TrafficLevel::Low => 0.0,
            TrafficLevel::Medium => 0.5,
            TrafficLevel::High => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrafficLevel::Low => "low",
            TrafficLevel::Medium => "medium",
            TrafficLevel::High => "high",
        }
    }
}

/// Vehicle category reported with an observation.
///
/// `Unrecognized` carries the raw value through normalization so that the
/// pricing models can reject it as an input validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Bike,
    Truck,
    Other,
    Unrecognized(String),
}

impl VehicleType {
    pub fn as_str(&self) -> &str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Bike => "bike",
            VehicleType::Truck => "truck",
            VehicleType::Other => "other",
            VehicleType::Unrecognized(raw) => raw.as_str(),
        }
    }
}

/// One sensor reading for one lot at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Lot identifier.
    pub lot_id: LotId,
    /// Observation time (ms).
    pub timestamp: TimestampMs,
    /// Number of spaces.
    pub capacity: i64,
    /// Occupied spaces.
    pub occupancy: i64,
    /// Vehicles waiting to enter.
    pub queue_length: i64,
    /// Nearby traffic condition.
    pub traffic_level: TrafficLevel,
    /// Holiday / event day.
    pub is_special_day: bool,
    /// Vehicle category.
    pub vehicle_type: VehicleType,
    pub latitude: f64,
    pub longitude: f64,
}

impl Observation {
    /// Validate the observation and derive its occupancy rate.
    ///
    /// Occupancy above capacity is clamped and zero capacity yields a rate of
    /// 0; both are reported as anomalies rather than errors. Negative counts,
    /// non-finite coordinates and unrecognized vehicle types fail.
    pub fn reading(&self) -> Result<OccupancyReading> {
        if self.capacity < 0 {
            return Err(Error::validation(format!(
                "lot {}: negative capacity {}",
                self.lot_id, self.capacity
            )));
        }
        if self.occupancy < 0 {
            return Err(Error::validation(format!(
                "lot {}: negative occupancy {}",
                self.lot_id, self.occupancy
            )));
        }
        if self.queue_length < 0 {
            return Err(Error::validation(format!(
                "lot {}: negative queue_length {}",
                self.lot_id, self.queue_length
            )));
        }
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(Error::validation(format!(
                "lot {}: non-finite coordinates",
                self.lot_id
            )));
        }
        if let VehicleType::Unrecognized(raw) = &self.vehicle_type {
            return Err(Error::validation(format!(
                "lot {}: unknown vehicle_type '{}'",
                self.lot_id, raw
            )));
        }

        let mut anomalies = Vec::new();
        if self.capacity == 0 {
            anomalies.push(Anomaly::ZeroCapacity);
            return Ok(OccupancyReading {
                occupancy: self.occupancy,
                capacity: 0,
                rate: 0.0,
                anomalies,
            });
        }

        let occupancy = if self.occupancy > self.capacity {
            anomalies.push(Anomaly::OccupancyClamped);
            self.capacity
        } else {
            self.occupancy
        };

        Ok(OccupancyReading {
            occupancy,
            capacity: self.capacity,
            rate: occupancy as f64 / self.capacity as f64,
            anomalies,
        })
    }
}

/// Validated occupancy figures for an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyReading {
    /// Occupancy after clamping to capacity.
    pub occupancy: i64,
    pub capacity: i64,
    /// Occupancy / capacity in [0, 1].
    pub rate: f64,
    pub anomalies: Vec<Anomaly>,
}

impl OccupancyReading {
    /// Lot has no free space.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.occupancy >= self.capacity
    }
}

/// Reason an observation was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    /// Occupancy exceeded capacity and was clamped.
    OccupancyClamped,
    /// Capacity was zero; rate treated as 0.
    ZeroCapacity,
    /// Candidate price was non-finite or non-positive.
    ComputationOverflow,
    /// Observation failed validation and was skipped.
    InputValidation,
    /// Observation arrived behind the lot's last commit and was skipped.
    OrderingViolation,
}

impl Anomaly {
    pub fn as_str(self) -> &'static str {
        match self {
            Anomaly::OccupancyClamped => "occupancy_clamped",
            Anomaly::ZeroCapacity => "zero_capacity",
            Anomaly::ComputationOverflow => "computation_overflow",
            Anomaly::InputValidation => "input_validation",
            Anomaly::OrderingViolation => "ordering_violation",
        }
    }
}

/// Pricing policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Baseline,
    Demand,
    Competitive,
}

impl ModelKind {
    /// All models, in evaluation order.
    pub const ALL: [ModelKind; 3] = [ModelKind::Baseline, ModelKind::Demand, ModelKind::Competitive];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Baseline => "baseline",
            ModelKind::Demand => "demand",
            ModelKind::Competitive => "competitive",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(ModelKind::Baseline),
            "demand" | "demand-based" | "demand_based" => Ok(ModelKind::Demand),
            "competitive" => Ok(ModelKind::Competitive),
            other => Err(Error::config(format!("unknown pricing model '{}'", other))),
        }
    }
}

/// A committed price at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: TimestampMs,
    pub price: f64,
}

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// `None` unless both coordinates are finite.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then_some(Self {
            latitude,
            longitude,
        })
    }
}

/// Per-lot pricing state for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct LotState {
    pub lot_id: LotId,
    /// Most recently committed price (base price before the first commit).
    pub last_price: f64,
    /// Timestamp of the most recent commit.
    pub last_timestamp: Option<TimestampMs>,
    /// Committed prices, oldest first.
    pub price_history: VecDeque<PricePoint>,
    /// Last known location, set on the first commit.
    pub location: Option<Location>,
}

impl LotState {
    /// Fresh state priced at `base_price`.
    pub fn new(lot_id: impl Into<LotId>, base_price: f64) -> Self {
        Self {
            lot_id: lot_id.into(),
            last_price: base_price,
            last_timestamp: None,
            price_history: VecDeque::new(),
            location: None,
        }
    }

    /// Whether the lot location is known.
    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    /// Latest committed price with timestamp at or before `ts`.
    pub fn price_as_of(&self, ts: TimestampMs) -> Option<f64> {
        self.price_history
            .iter()
            .rev()
            .find(|p| p.timestamp <= ts)
            .map(|p| p.price)
    }
}

/// A cheaper nearby lot offered when the own lot is full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reroute {
    pub lot_id: LotId,
    pub distance_km: f64,
    pub price: f64,
    /// Own price minus the neighbor's price.
    pub savings: f64,
}

/// One price decision for one observation under one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub lot_id: LotId,
    pub timestamp: TimestampMs,
    pub model: ModelKind,
    /// Stabilized price.
    pub price: f64,
    /// Raw model output before stabilization.
    pub candidate: f64,
    pub occupancy_rate: f64,
    /// Observation was clamped or the candidate overflowed.
    pub anomalous: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reroutes: Vec<Reroute>,
}

/// An observation that could not be priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub lot_id: LotId,
    pub timestamp: TimestampMs,
    pub kind: Anomaly,
    pub detail: String,
}
