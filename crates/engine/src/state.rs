//! Per-lot pricing state.
//!
//! One store per model lane. Lots are kept in a `BTreeMap` so iteration, and
//! therefore neighbor ordering, does not depend on arrival order.

use std::collections::BTreeMap;

use parking_core::{Error, Location, LotId, LotState, PricePoint, Result, TimestampMs};
use parking_models::{haversine_km, Neighbor};

/// Pricing state for every lot seen by one model.
#[derive(Debug, Clone, Default)]
pub struct LotStateStore {
    lots: BTreeMap<LotId, LotState>,
    history_limit: Option<usize>,
}

impl LotStateStore {
    /// Create an empty store. `history_limit` caps each lot's price history.
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            lots: BTreeMap::new(),
            history_limit,
        }
    }

    pub fn get(&self, lot_id: &str) -> Option<&LotState> {
        self.lots.get(lot_id)
    }

    /// State for `lot_id`, created at `base_price` on first sight.
    pub fn get_or_init(&mut self, lot_id: &str, base_price: f64) -> &LotState {
        self.lots
            .entry(lot_id.to_string())
            .or_insert_with(|| LotState::new(lot_id, base_price))
    }

    /// Reject `timestamp` if it precedes the lot's last commit.
    pub fn check_order(&self, lot_id: &str, timestamp: TimestampMs) -> Result<()> {
        match self.lots.get(lot_id).and_then(|s| s.last_timestamp) {
            Some(last) if timestamp < last => Err(Error::OrderingViolation {
                lot_id: lot_id.to_string(),
                timestamp,
                last_timestamp: last,
            }),
            _ => Ok(()),
        }
    }

    /// Record the lot's latest known position. Non-finite coordinates are ignored.
    pub fn locate(&mut self, lot_id: &str, latitude: f64, longitude: f64) {
        let Some(location) = Location::new(latitude, longitude) else {
            return;
        };
        if let Some(state) = self.lots.get_mut(lot_id) {
            state.location = Some(location);
        }
    }

    /// Commit `price` at `timestamp` and append it to the lot's history.
    ///
    /// Equal timestamps are accepted; older ones fail with
    /// [`Error::OrderingViolation`] and leave the state untouched.
    pub fn commit(&mut self, lot_id: &str, price: f64, timestamp: TimestampMs) -> Result<()> {
        self.check_order(lot_id, timestamp)?;
        let state = self
            .lots
            .get_mut(lot_id)
            .ok_or_else(|| Error::state(format!("commit for unknown lot {}", lot_id)))?;

        state.last_price = price;
        state.last_timestamp = Some(timestamp);
        state.price_history.push_back(PricePoint { timestamp, price });
        if let Some(limit) = self.history_limit {
            while state.price_history.len() > limit.max(1) {
                state.price_history.pop_front();
            }
        }
        Ok(())
    }

    /// Located lots within `radius_km` of a point, excluding `lot_id`.
    ///
    /// Only prices committed at or before `as_of` are visible. Results are
    /// ordered by distance, then lot id.
    pub fn neighbors_within(
        &self,
        lot_id: &str,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        as_of: TimestampMs,
    ) -> Vec<Neighbor> {
        let Some(origin) = Location::new(latitude, longitude) else {
            return Vec::new();
        };

        let mut neighbors: Vec<Neighbor> = self
            .lots
            .values()
            .filter(|s| s.lot_id != lot_id)
            .filter_map(|s| {
                let at = s.location?;
                let distance_km =
                    haversine_km(origin.latitude, origin.longitude, at.latitude, at.longitude);
                if distance_km > radius_km {
                    return None;
                }
                s.price_as_of(as_of).map(|price| Neighbor {
                    lot_id: s.lot_id.clone(),
                    distance_km,
                    price,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.lot_id.cmp(&b.lot_id))
        });
        neighbors
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LotState> {
        self.lots.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(lots: &[(&str, f64, f64, f64, TimestampMs)]) -> LotStateStore {
        let mut store = LotStateStore::new(None);
        for &(id, lat, lon, price, ts) in lots {
            store.get_or_init(id, 10.0);
            store.locate(id, lat, lon);
            store.commit(id, price, ts).unwrap();
        }
        store
    }

    #[test]
    fn test_lazy_init_at_base_price() {
        let mut store = LotStateStore::new(None);
        let state = store.get_or_init("A", 10.0);
        assert_eq!(state.last_price, 10.0);
        assert!(state.last_timestamp.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_commit_updates_history() {
        let mut store = LotStateStore::new(None);
        store.get_or_init("A", 10.0);
        store.commit("A", 10.5, 100).unwrap();
        store.commit("A", 11.0, 100).unwrap();

        let state = store.get("A").unwrap();
        assert_eq!(state.last_price, 11.0);
        assert_eq!(state.last_timestamp, Some(100));
        assert_eq!(state.price_history.len(), 2);
    }

    #[test]
    fn test_regression_rejected_without_change() {
        let mut store = LotStateStore::new(None);
        store.get_or_init("A", 10.0);
        store.commit("A", 10.5, 200).unwrap();
        let before = store.get("A").unwrap().clone();

        let err = store.commit("A", 9.0, 100).unwrap_err();
        assert!(matches!(err, Error::OrderingViolation { last_timestamp: 200, .. }));
        assert_eq!(store.get("A").unwrap(), &before);
    }

    #[test]
    fn test_regression_on_unlocated_lot_leaves_state_equal() {
        let mut store = LotStateStore::new(None);
        store.get_or_init("A", 10.0);
        store.commit("A", 10.5, 200).unwrap();
        let before = store.get("A").unwrap().clone();
        assert!(before.location.is_none());

        assert!(store.check_order("A", 100).is_err());
        assert!(store.commit("A", 9.0, 100).is_err());
        assert_eq!(store.get("A").unwrap(), &before);
    }

    #[test]
    fn test_locate_ignores_non_finite() {
        let mut store = LotStateStore::new(None);
        store.get_or_init("A", 10.0);
        store.locate("A", f64::NAN, 91.0);
        assert!(!store.get("A").unwrap().has_location());
        store.locate("A", 26.0, 91.0);
        assert_eq!(store.get("A").unwrap().location, Location::new(26.0, 91.0));
    }

    #[test]
    fn test_commit_unknown_lot() {
        let mut store = LotStateStore::new(None);
        assert!(matches!(store.commit("X", 10.0, 0), Err(Error::State(_))));
    }

    #[test]
    fn test_history_limit() {
        let mut store = LotStateStore::new(Some(3));
        store.get_or_init("A", 10.0);
        for i in 0..10 {
            store.commit("A", 10.0 + i as f64 * 0.1, i).unwrap();
        }
        let history = &store.get("A").unwrap().price_history;
        assert_eq!(history.len(), 3);
        assert_eq!(history.front().unwrap().timestamp, 7);
    }

    #[test]
    fn test_neighbors_sorted_and_filtered() {
        // ~0.11 km per 0.001 degrees of latitude
        let store = store_with(&[
            ("SELF", 26.000, 91.0, 10.0, 0),
            ("FAR", 26.100, 91.0, 8.0, 0),
            ("B", 26.002, 91.0, 9.0, 0),
            ("A", 26.002, 91.0, 9.5, 0),
            ("C", 26.001, 91.0, 11.0, 0),
        ]);

        let neighbors = store.neighbors_within("SELF", 26.0, 91.0, 0.555, 0);
        let ids: Vec<_> = neighbors.iter().map(|n| n.lot_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_neighbors_never_see_future_prices() {
        let mut store = store_with(&[("B", 26.001, 91.0, 9.0, 100)]);
        store.commit("B", 12.0, 300).unwrap();

        assert!(store.neighbors_within("A", 26.0, 91.0, 1.0, 50).is_empty());
        assert_eq!(store.neighbors_within("A", 26.0, 91.0, 1.0, 200)[0].price, 9.0);
        assert_eq!(store.neighbors_within("A", 26.0, 91.0, 1.0, 300)[0].price, 12.0);
    }

    #[test]
    fn test_unlocated_lots_are_not_neighbors() {
        let mut store = LotStateStore::new(None);
        store.get_or_init("B", 10.0);
        store.commit("B", 9.0, 0).unwrap();
        assert!(store.neighbors_within("A", 26.0, 91.0, 1.0, 10).is_empty());
        assert!(store.neighbors_within("A", f64::NAN, 91.0, 1.0, 10).is_empty());
    }
}
