//! Inputs shared by all pricing models.

use parking_core::{LotId, LotState, Observation, OccupancyReading};
use serde::Serialize;

/// A nearby lot and its committed price at the time of the observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub lot_id: LotId,
    pub distance_km: f64,
    pub price: f64,
}

/// Everything a model may read when pricing one observation.
///
/// Built from committed state only, so evaluation is pure.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub observation: &'a Observation,
    /// Validated occupancy figures for the observation.
    pub reading: &'a OccupancyReading,
    /// The lot's state before this observation.
    pub state: &'a LotState,
    /// Neighbors within the competitive radius, nearest first.
    pub neighbors: &'a [Neighbor],
}

impl<'a> PricingContext<'a> {
    pub fn new(
        observation: &'a Observation,
        reading: &'a OccupancyReading,
        state: &'a LotState,
        neighbors: &'a [Neighbor],
    ) -> Self {
        Self {
            observation,
            reading,
            state,
            neighbors,
        }
    }

    #[inline]
    pub fn occupancy_rate(&self) -> f64 {
        self.reading.rate
    }

    /// Mean neighbor price, if any neighbor is known.
    pub fn competitor_avg(&self) -> Option<f64> {
        if self.neighbors.is_empty() {
            return None;
        }
        let sum: f64 = self.neighbors.iter().map(|n| n.price).sum();
        Some(sum / self.neighbors.len() as f64)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use parking_core::{LotState, Observation, TrafficLevel, VehicleType};

    pub fn observation(capacity: i64, occupancy: i64) -> Observation {
        Observation {
            lot_id: "LOT-A".to_string(),
            timestamp: 1_000,
            capacity,
            occupancy,
            queue_length: 0,
            traffic_level: TrafficLevel::Low,
            is_special_day: false,
            vehicle_type: VehicleType::Car,
            latitude: 26.1445,
            longitude: 91.7362,
        }
    }

    pub fn state(last_price: f64) -> LotState {
        LotState::new("LOT-A", last_price)
    }
}
