//! Streaming pricing engine.
//!
//! Replays observations through every active model. Each model owns a lane
//! with its own per-lot state, so models never read one another's prices.
//! An observation is priced atomically: either every lane commits and emits
//! an event, or none does and the observation is reported as an anomaly.
//!
//! Lifecycle: `Idle -> Streaming -> Draining -> Done`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_core::{
    Anomaly, AnomalyRecord, Config, Error, LotState, ModelKind, Observation, OccupancyReading,
    PriceEvent, ReplayOrdering, Reroute, Result,
};
use parking_ingestion::ObservationSource;
use parking_models::{PriceStabilizer, PricingContext, PricingModel, Stabilized};
use tracing::{debug, info, warn};

use crate::sink::ResultsSink;
use crate::state::LotStateStore;
use crate::summary::RunSummary;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Configured, not yet consuming.
    Idle,
    /// Consuming observations.
    Streaming,
    /// Source exhausted or stop requested; flushing buffered events.
    Draining,
    /// All output flushed.
    Done,
}

/// Cooperative cancellation flag, checked between observations.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One model and the lot state it prices from.
#[derive(Debug, Clone)]
struct ModelLane {
    model: PricingModel,
    store: LotStateStore,
}

/// Lane output computed before anything is committed.
struct LaneDecision {
    candidate: f64,
    stabilized: Stabilized,
    reroutes: Vec<Reroute>,
}

/// Streaming multi-model pricing engine.
pub struct PricingEngine {
    config: Config,
    lanes: Vec<ModelLane>,
    stabilizer: PriceStabilizer,
    state: EngineState,
    buffer: Vec<PriceEvent>,
    summary: RunSummary,
    stop: StopHandle,
}

impl PricingEngine {
    /// Build an engine. Invalid configuration is fatal.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mut kinds: Vec<ModelKind> = Vec::new();
        for kind in &config.engine.active_models {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        let lanes = kinds
            .into_iter()
            .map(|kind| ModelLane {
                model: PricingModel::from_config(kind, &config),
                store: LotStateStore::new(config.pricing.history_limit),
            })
            .collect();

        Ok(Self {
            stabilizer: PriceStabilizer::from_config(&config),
            buffer: Vec::with_capacity(config.engine.flush_every),
            config,
            lanes,
            state: EngineState::Idle,
            summary: RunSummary::default(),
            stop: StopHandle::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Active models, in lane order.
    pub fn models(&self) -> Vec<ModelKind> {
        self.lanes.iter().map(|l| l.model.kind()).collect()
    }

    /// Handle that stops a run between observations.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Committed state of `lot_id` under `model`.
    pub fn lot_state(&self, model: ModelKind, lot_id: &str) -> Option<&LotState> {
        self.lanes
            .iter()
            .find(|l| l.model.kind() == model)
            .and_then(|l| l.store.get(lot_id))
    }

    /// Discard all lot state and counters and return to `Idle`.
    pub fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.store = LotStateStore::new(self.config.pricing.history_limit);
        }
        self.buffer.clear();
        self.summary = RunSummary::default();
        self.stop.clear();
        self.state = EngineState::Idle;
    }

    /// Move from `Idle` to `Streaming`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != EngineState::Idle {
            return Err(Error::state(format!("cannot start from {:?}", self.state)));
        }
        info!(models = ?self.models(), "pricing engine streaming");
        self.state = EngineState::Streaming;
        Ok(())
    }

    /// Replay `source` to completion (or until stopped) and drain.
    ///
    /// Only configuration, source-open and sink failures abort the run;
    /// per-observation problems are counted and reported to the sink.
    pub fn run<S, K>(&mut self, source: &S, sink: &mut K) -> Result<RunSummary>
    where
        S: ObservationSource + ?Sized,
        K: ResultsSink + ?Sized,
    {
        if self.state != EngineState::Idle {
            return Err(Error::state(format!("cannot run from {:?}", self.state)));
        }
        let items = source.open()?;
        info!(source = %source.describe(), ordering = ?self.config.engine.ordering, "replay starting");
        self.start()?;

        let limit = self.config.engine.max_observations.unwrap_or(usize::MAX);
        let items = items.take(limit);

        match self.config.engine.ordering {
            ReplayOrdering::Arrival => {
                for item in items {
                    if self.stop_requested() {
                        break;
                    }
                    self.accept(item, sink)?;
                }
            }
            ReplayOrdering::Timestamp => {
                let mut observations = Vec::new();
                for item in items {
                    match item {
                        Ok(obs) => observations.push(obs),
                        Err(e) => self.reject(e, sink)?,
                    }
                }
                // Stable: equal (timestamp, lot) keep arrival order
                observations.sort_by(|a, b| {
                    a.timestamp
                        .cmp(&b.timestamp)
                        .then_with(|| a.lot_id.cmp(&b.lot_id))
                });
                for obs in observations {
                    if self.stop_requested() {
                        break;
                    }
                    self.process(obs, sink)?;
                }
            }
        }

        self.finish(sink)
    }

    fn stop_requested(&mut self) -> bool {
        if self.stop.is_stop_requested() {
            if !self.summary.stopped_early {
                info!("stop requested, draining");
            }
            self.summary.stopped_early = true;
            true
        } else {
            false
        }
    }

    fn accept<K: ResultsSink + ?Sized>(
        &mut self,
        item: Result<Observation>,
        sink: &mut K,
    ) -> Result<()> {
        match item {
            Ok(obs) => self.process(obs, sink),
            Err(e) => self.reject(e, sink),
        }
    }

    /// Count a record the source could not turn into an observation.
    ///
    /// Non-recoverable errors (unreadable source) are returned.
    pub fn reject<K: ResultsSink + ?Sized>(&mut self, err: Error, sink: &mut K) -> Result<()> {
        if !err.is_recoverable() {
            return Err(err);
        }
        self.summary.observations_read += 1;
        self.summary.validation_skipped += 1;
        warn!(error = %err, "skipping unreadable record");
        sink.write_anomaly(&AnomalyRecord {
            lot_id: String::new(),
            timestamp: 0,
            kind: Anomaly::InputValidation,
            detail: err.to_string(),
        })
    }

    /// Price one observation under every lane.
    ///
    /// Invalid or out-of-order observations are skipped and reported; only
    /// sink failures and lifecycle misuse are returned as errors.
    pub fn process<K: ResultsSink + ?Sized>(
        &mut self,
        obs: Observation,
        sink: &mut K,
    ) -> Result<()> {
        if self.state != EngineState::Streaming {
            return Err(Error::state(format!(
                "cannot process observations while {:?}",
                self.state
            )));
        }
        self.summary.observations_read += 1;

        let reading = match obs.reading() {
            Ok(reading) => reading,
            Err(e) => return self.skip(&obs, Anomaly::InputValidation, e, sink),
        };

        let in_order = self
            .lanes
            .iter()
            .try_for_each(|l| l.store.check_order(&obs.lot_id, obs.timestamp));
        if let Err(e) = in_order {
            return self.skip(&obs, Anomaly::OrderingViolation, e, sink);
        }

        let decisions = match self.decide(&obs, &reading) {
            Ok(decisions) => decisions,
            Err(e) if e.is_recoverable() => {
                return self.skip(&obs, Anomaly::InputValidation, e, sink)
            }
            Err(e) => return Err(e),
        };

        for record in self.commit(&obs, &reading, decisions)? {
            sink.write_anomaly(&record)?;
        }

        if self.buffer.len() >= self.config.engine.flush_every {
            self.flush_buffer(sink)?;
        }
        Ok(())
    }

    /// Evaluate and stabilize every lane without mutating committed state.
    fn decide(&mut self, obs: &Observation, reading: &OccupancyReading) -> Result<Vec<LaneDecision>> {
        let base_price = self.config.pricing.base_price;
        let mut decisions = Vec::with_capacity(self.lanes.len());

        for lane in &mut self.lanes {
            let neighbors = match lane.model.neighbor_radius_km() {
                Some(radius) => lane.store.neighbors_within(
                    &obs.lot_id,
                    obs.latitude,
                    obs.longitude,
                    radius,
                    obs.timestamp,
                ),
                None => Vec::new(),
            };
            let state = lane.store.get_or_init(&obs.lot_id, base_price);
            let ctx = PricingContext::new(obs, reading, state, &neighbors);

            let candidate = lane.model.evaluate(&ctx)?;
            let stabilized = self.stabilizer.stabilize(candidate, state.last_price);
            let reroutes = lane.model.reroutes(&ctx, stabilized.price);

            decisions.push(LaneDecision {
                candidate,
                stabilized,
                reroutes,
            });
        }
        Ok(decisions)
    }

    /// Commit every lane and buffer its event. Returns a record for each
    /// lane whose candidate overflowed.
    fn commit(
        &mut self,
        obs: &Observation,
        reading: &OccupancyReading,
        decisions: Vec<LaneDecision>,
    ) -> Result<Vec<AnomalyRecord>> {
        let flagged = !reading.anomalies.is_empty();
        let mut overflows = Vec::new();

        for (lane, decision) in self.lanes.iter_mut().zip(decisions) {
            let kind = lane.model.kind();
            let Stabilized {
                price,
                overflow,
                step_limited,
                bounded,
            } = decision.stabilized;

            lane.store.locate(&obs.lot_id, obs.latitude, obs.longitude);
            lane.store.commit(&obs.lot_id, price, obs.timestamp)?;

            if overflow {
                self.summary.overflow_clamped += 1;
                warn!(
                    lot_id = %obs.lot_id,
                    model = %kind,
                    candidate = decision.candidate,
                    "candidate overflow, priced at floor"
                );
                let err = Error::overflow(format!(
                    "{} candidate {} replaced by floor {}",
                    kind,
                    decision.candidate,
                    self.stabilizer.config().min_price
                ));
                overflows.push(AnomalyRecord {
                    lot_id: obs.lot_id.clone(),
                    timestamp: obs.timestamp,
                    kind: Anomaly::ComputationOverflow,
                    detail: err.to_string(),
                });
            }
            if step_limited {
                self.summary.step_limited += 1;
            }
            if bounded {
                self.summary.bound_clamped += 1;
                debug!(
                    lot_id = %obs.lot_id,
                    model = %kind,
                    candidate = decision.candidate,
                    price,
                    "candidate clamped to price bounds"
                );
            }
            *self.summary.events.entry(kind).or_default() += 1;

            self.buffer.push(PriceEvent {
                lot_id: obs.lot_id.clone(),
                timestamp: obs.timestamp,
                model: kind,
                price,
                candidate: decision.candidate,
                occupancy_rate: reading.rate,
                anomalous: flagged || overflow || bounded,
                reroutes: decision.reroutes,
            });
        }

        for anomaly in &reading.anomalies {
            match anomaly {
                Anomaly::OccupancyClamped => self.summary.occupancy_clamped += 1,
                Anomaly::ZeroCapacity => self.summary.zero_capacity += 1,
                _ => {}
            }
        }
        if flagged {
            debug!(lot_id = %obs.lot_id, anomalies = ?reading.anomalies, "priced with anomalies");
        }

        self.summary.observations_priced += 1;
        self.summary.note_timestamp(obs.timestamp);
        self.summary.lots = self.lanes.first().map_or(0, |l| l.store.len());
        Ok(overflows)
    }

    fn skip<K: ResultsSink + ?Sized>(
        &mut self,
        obs: &Observation,
        kind: Anomaly,
        err: Error,
        sink: &mut K,
    ) -> Result<()> {
        match kind {
            Anomaly::OrderingViolation => self.summary.ordering_violations += 1,
            _ => self.summary.validation_skipped += 1,
        }
        warn!(lot_id = %obs.lot_id, timestamp = obs.timestamp, error = %err, "observation skipped");
        sink.write_anomaly(&AnomalyRecord {
            lot_id: obs.lot_id.clone(),
            timestamp: obs.timestamp,
            kind,
            detail: err.to_string(),
        })
    }

    fn flush_buffer<K: ResultsSink + ?Sized>(&mut self, sink: &mut K) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        debug!(count = self.buffer.len(), "flushing price events");
        sink.write_events(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    /// Drain buffered events, flush the sink and move to `Done`.
    pub fn finish<K: ResultsSink + ?Sized>(&mut self, sink: &mut K) -> Result<RunSummary> {
        if self.state != EngineState::Streaming {
            return Err(Error::state(format!("cannot finish from {:?}", self.state)));
        }
        self.state = EngineState::Draining;
        self.flush_buffer(sink)?;
        sink.flush()?;
        self.state = EngineState::Done;

        info!(
            read = self.summary.observations_read,
            priced = self.summary.observations_priced,
            skipped = self.summary.skipped(),
            events = self.summary.total_events(),
            lots = self.summary.lots,
            "replay complete"
        );
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::JsonLinesSink;
    use crate::sink::CollectingSink;
    use approx::assert_relative_eq;
    use parking_core::{TrafficLevel, VehicleType};
    use parking_ingestion::MemorySource;

    fn obs(lot_id: &str, ts: i64, capacity: i64, occupancy: i64) -> Observation {
        Observation {
            lot_id: lot_id.to_string(),
            timestamp: ts,
            capacity,
            occupancy,
            queue_length: 2,
            traffic_level: TrafficLevel::Medium,
            is_special_day: false,
            vehicle_type: VehicleType::Car,
            latitude: 26.1445,
            longitude: 91.7362,
        }
    }

    fn at(mut o: Observation, lat: f64, lon: f64) -> Observation {
        o.latitude = lat;
        o.longitude = lon;
        o
    }

    fn mixed_stream() -> Vec<Observation> {
        let mut out = Vec::new();
        for step in 0..40i64 {
            let ts = step * 1_800_000;
            out.push(at(obs("LOT-A", ts, 100, (step * 7) % 101), 26.1445, 91.7362));
            out.push(at(obs("LOT-B", ts, 80, 80 - (step % 30)), 26.1465, 91.7362));
            out.push(at(obs("LOT-C", ts, 50, (step * 3) % 60), 26.1455, 91.7372));
        }
        out
    }

    fn run_collect(config: Config, observations: Vec<Observation>) -> (RunSummary, CollectingSink) {
        let mut engine = PricingEngine::new(config).unwrap();
        let mut sink = CollectingSink::new();
        let summary = engine.run(&MemorySource::new(observations), &mut sink).unwrap();
        (summary, sink)
    }

    #[test]
    fn test_lifecycle() {
        let mut engine = PricingEngine::new(Config::default()).unwrap();
        let mut sink = CollectingSink::new();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.process(obs("A", 0, 10, 5), &mut sink).is_err());

        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Streaming);
        engine.process(obs("A", 0, 10, 5), &mut sink).unwrap();
        engine.finish(&mut sink).unwrap();
        assert_eq!(engine.state(), EngineState::Done);

        assert!(engine.process(obs("A", 1, 10, 5), &mut sink).is_err());
        assert!(engine.run(&MemorySource::default(), &mut sink).is_err());

        engine.reset();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.lot_state(ModelKind::Baseline, "A").is_none());
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = Config::default();
        config.stabilizer.min_price = -1.0;
        assert!(matches!(PricingEngine::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_every_model_emits_per_observation() {
        let (summary, sink) = run_collect(Config::default(), mixed_stream());
        assert_eq!(summary.observations_priced, 120);
        assert_eq!(sink.events().len(), 360);
        for model in ModelKind::ALL {
            assert_eq!(summary.events[&model], 120);
            assert_eq!(sink.stream(model).count(), 120);
        }
        assert_eq!(sink.joined().len(), 120);
        assert_eq!(summary.lots, 3);
    }

    #[test]
    fn test_floor_and_step_hold_for_every_event() {
        let (_, sink) = run_collect(Config::default(), mixed_stream());
        let mut last: std::collections::HashMap<(String, ModelKind), f64> = Default::default();

        for event in sink.events() {
            assert!(event.price >= 5.0, "{:?}", event);
            assert!(event.price <= 20.0, "{:?}", event);
            let prior = last
                .insert((event.lot_id.clone(), event.model), event.price)
                .unwrap_or(10.0);
            assert!((event.price - prior).abs() / prior <= 0.1 + 1e-9, "{:?}", event);
        }
    }

    #[test]
    fn test_replay_is_deterministic() {
        let render = || {
            let mut engine = PricingEngine::new(Config::default()).unwrap();
            let mut sink = JsonLinesSink::new(Vec::new());
            engine.run(&MemorySource::new(mixed_stream()), &mut sink).unwrap();
            sink.into_inner().unwrap()
        };
        let first = render();
        assert!(!first.is_empty());
        assert_eq!(first, render());
    }

    #[test]
    fn test_timestamp_ordering_sorts_input() {
        let input = vec![obs("A", 300, 10, 9), obs("A", 100, 10, 5), obs("A", 200, 10, 7)];
        let (summary, sink) = run_collect(Config::default(), input);
        assert_eq!(summary.ordering_violations, 0);
        let ts: Vec<_> = sink.stream(ModelKind::Baseline).map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![100, 200, 300]);
    }

    #[test]
    fn test_arrival_ordering_rejects_regression() {
        let mut config = Config::default();
        config.engine.ordering = ReplayOrdering::Arrival;
        let mut engine = PricingEngine::new(config).unwrap();
        let mut sink = CollectingSink::new();
        engine.start().unwrap();

        engine.process(obs("A", 200, 10, 9), &mut sink).unwrap();
        let before: Vec<_> = ModelKind::ALL
            .iter()
            .map(|m| engine.lot_state(*m, "A").cloned())
            .collect();

        engine.process(obs("A", 100, 10, 2), &mut sink).unwrap();
        let after: Vec<_> = ModelKind::ALL
            .iter()
            .map(|m| engine.lot_state(*m, "A").cloned())
            .collect();
        assert_eq!(before, after);

        // Equal timestamps are accepted
        engine.process(obs("A", 200, 10, 8), &mut sink).unwrap();
        let summary = engine.finish(&mut sink).unwrap();

        assert_eq!(summary.ordering_violations, 1);
        assert_eq!(summary.observations_priced, 2);
        assert_eq!(sink.anomalies().len(), 1);
        assert_eq!(sink.anomalies()[0].kind, Anomaly::OrderingViolation);
    }

    #[test]
    fn test_invalid_observations_are_skipped() {
        let mut negative = obs("A", 100, 10, 5);
        negative.queue_length = -1;
        let mut unknown = obs("B", 100, 10, 5);
        unknown.vehicle_type = VehicleType::Unrecognized("hovercraft".into());

        let input = vec![obs("A", 0, 10, 5), negative, unknown, obs("A", 200, 10, 6)];
        let (summary, sink) = run_collect(Config::default(), input);

        assert_eq!(summary.observations_read, 4);
        assert_eq!(summary.validation_skipped, 2);
        assert_eq!(summary.observations_priced, 2);
        assert_eq!(sink.anomalies().len(), 2);
        assert!(sink
            .anomalies()
            .iter()
            .all(|a| a.kind == Anomaly::InputValidation));
        assert!(sink.events().iter().all(|e| e.lot_id == "A"));
    }

    #[test]
    fn test_clamped_occupancy_is_priced_and_flagged() {
        let (summary, sink) = run_collect(Config::default(), vec![obs("A", 0, 10, 15)]);
        assert_eq!(summary.occupancy_clamped, 1);
        assert!(sink.events().iter().all(|e| e.anomalous));
        assert!(sink.events().iter().all(|e| e.occupancy_rate == 1.0));
    }

    #[test]
    fn test_zero_capacity_is_priced() {
        let (summary, sink) = run_collect(Config::default(), vec![obs("A", 0, 0, 0)]);
        assert_eq!(summary.zero_capacity, 1);
        assert_eq!(sink.events().len(), 3);
        assert!(sink.events().iter().all(|e| e.price >= 5.0));
    }

    #[test]
    fn test_competitive_never_sees_later_prices() {
        let mut config = Config::default();
        config.engine.active_models = vec![ModelKind::Competitive];
        config.engine.ordering = ReplayOrdering::Arrival;

        // B is observed after A in time; A's first price cannot depend on B
        let alone = run_collect(config.clone(), vec![at(obs("A", 0, 100, 95), 26.0, 91.0)]).1;
        let with_future = run_collect(
            config,
            vec![
                at(obs("B", 500, 100, 10), 26.001, 91.0),
                at(obs("A", 0, 100, 95), 26.0, 91.0),
            ],
        )
        .1;

        let a_alone = alone.events()[0].price;
        let a_later = with_future
            .events()
            .iter()
            .find(|e| e.lot_id == "A")
            .unwrap()
            .price;
        assert_eq!(a_alone, a_later);
    }

    #[test]
    fn test_models_keep_separate_state() {
        let (_, sink) = run_collect(Config::default(), mixed_stream());
        let last = |model| {
            sink.stream(model)
                .filter(|e| e.lot_id == "LOT-B")
                .last()
                .unwrap()
                .price
        };
        assert_ne!(last(ModelKind::Baseline), last(ModelKind::Demand));
    }

    #[test]
    fn test_flush_every_batches_output() {
        let mut config = Config::default();
        config.engine.flush_every = 10;
        let (_, sink) = run_collect(config, mixed_stream());
        assert_eq!(sink.events().len(), 360);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn test_max_observations() {
        let mut config = Config::default();
        config.engine.max_observations = Some(7);
        let (summary, _) = run_collect(config, mixed_stream());
        assert_eq!(summary.observations_read, 7);
    }

    #[test]
    fn test_stop_handle() {
        let mut engine = PricingEngine::new(Config::default()).unwrap();
        engine.stop_handle().request_stop();
        let mut sink = CollectingSink::new();
        let summary = engine
            .run(&MemorySource::new(mixed_stream()), &mut sink)
            .unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.observations_priced, 0);
        assert_eq!(engine.state(), EngineState::Done);
    }

    #[test]
    fn test_single_model_lane() {
        let mut config = Config::default();
        config.engine.active_models = vec![ModelKind::Demand, ModelKind::Demand];
        let engine = PricingEngine::new(config).unwrap();
        assert_eq!(engine.models(), vec![ModelKind::Demand]);
    }

    #[test]
    fn test_stop_handle_survives_reset() {
        let mut engine = PricingEngine::new(Config::default()).unwrap();
        let handle = engine.stop_handle();
        handle.request_stop();
        engine.reset();
        assert!(!handle.is_stop_requested());

        handle.request_stop();
        let mut sink = CollectingSink::new();
        let summary = engine
            .run(&MemorySource::new(mixed_stream()), &mut sink)
            .unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.observations_priced, 0);
    }

    #[test]
    fn test_candidate_below_floor_is_counted_and_flagged() {
        let mut config = Config::default();
        config.pricing.base_price = 5.0;
        config.engine.active_models = vec![ModelKind::Baseline];

        // 5 + 0.5 * (0 - 0.5) = 4.75, held at the 5.0 floor
        let (summary, sink) = run_collect(config, vec![obs("A", 0, 100, 0)]);
        let event = &sink.events()[0];
        assert_eq!(event.price, 5.0);
        assert_relative_eq!(event.candidate, 4.75);
        assert!(event.anomalous);
        assert_eq!(summary.bound_clamped, 1);
        assert_eq!(summary.overflow_clamped, 0);
        assert!(sink.anomalies().is_empty());
    }

    #[test]
    fn test_negative_candidate_emits_overflow_anomaly() {
        let mut config = Config::default();
        config.pricing.base_price = 5.0;
        config.baseline.alpha = 100.0;
        config.engine.active_models = vec![ModelKind::Baseline];

        // 5 + 100 * (0 - 0.5) = -45
        let (summary, sink) = run_collect(config, vec![obs("A", 0, 100, 0)]);
        let event = &sink.events()[0];
        assert_eq!(event.price, 5.0);
        assert!(event.anomalous);
        assert_eq!(summary.overflow_clamped, 1);
        assert_eq!(summary.observations_priced, 1);

        let anomalies = sink.anomalies();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, Anomaly::ComputationOverflow);
        assert_eq!(anomalies[0].lot_id, "A");
        assert!(anomalies[0].detail.contains("baseline"));
    }

    #[test]
    fn test_csv_replay_end_to_end() {
        use parking_ingestion::CsvSource;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "ID,SystemCodeNumber,Capacity,Latitude,Longitude,Occupancy,VehicleType,\
             TrafficConditionNearby,QueueLength,IsSpecialDay,LastUpdatedDate,LastUpdatedTime"
        )
        .unwrap();
        for row in [
            "0,BHMBCCMKT01,577,26.144,91.736,61,car,low,1,0,04-10-2016,07:59:00",
            "1,BHMBCCTHL01,387,26.145,91.736,387,truck,high,9,1,04-10-2016,07:59:00",
            "2,BHMBCCMKT01,577,26.144,91.736,64,bike,average,1,0,04-10-2016,08:25:00",
            "3,BHMBCCMKT01,577,26.144,91.736,oops,car,low,1,0,04-10-2016,08:59:00",
            "4,BHMBCCTHL01,387,26.145,91.736,380,hovercraft,low,2,0,04-10-2016,08:25:00",
        ] {
            writeln!(file, "{}", row).unwrap();
        }

        let mut engine = PricingEngine::new(Config::default()).unwrap();
        let mut sink = CollectingSink::new();
        let summary = engine.run(&CsvSource::new(file.path()), &mut sink).unwrap();

        assert_eq!(summary.observations_read, 5);
        assert_eq!(summary.validation_skipped, 2);
        assert_eq!(summary.observations_priced, 3);
        assert_eq!(sink.joined().len(), 3);

        // The full lot sees its cheaper neighbor ~0.11 km away, priced at the same instant
        let full: Vec<_> = sink
            .stream(ModelKind::Competitive)
            .filter(|e| e.lot_id == "BHMBCCTHL01")
            .collect();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].reroutes.len(), 1);
        assert_eq!(full[0].reroutes[0].lot_id, "BHMBCCMKT01");
    }
}
