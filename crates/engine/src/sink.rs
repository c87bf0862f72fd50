//! Results sinks.
//!
//! The engine hands price events to a sink in batches and anomaly records
//! one at a time. Events for one observation are always delivered adjacent,
//! in lane order.

use std::collections::BTreeMap;

use parking_core::{AnomalyRecord, LotId, ModelKind, PriceEvent, Result, TimestampMs};
use serde::Serialize;

/// Destination for engine output.
pub trait ResultsSink {
    /// Accept a batch of price events, in emission order.
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()>;

    /// Accept a record for an observation that was skipped or flagged.
    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()>;

    /// Push buffered output to its destination.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: ResultsSink + ?Sized> ResultsSink for &mut S {
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()> {
        (**self).write_events(events)
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()> {
        (**self).write_anomaly(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: ResultsSink + ?Sized> ResultsSink for Box<S> {
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()> {
        (**self).write_events(events)
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()> {
        (**self).write_anomaly(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultsSink for NullSink {
    fn write_events(&mut self, _events: &[PriceEvent]) -> Result<()> {
        Ok(())
    }

    fn write_anomaly(&mut self, _record: &AnomalyRecord) -> Result<()> {
        Ok(())
    }
}

/// Forwards output to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn ResultsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn ResultsSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultsSink for FanoutSink {
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write_events(events)?;
        }
        Ok(())
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write_anomaly(record)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// One observation with the price from every active model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub timestamp: TimestampMs,
    pub lot_id: LotId,
    pub occupancy_rate: f64,
    pub prices: BTreeMap<ModelKind, f64>,
}

impl JoinedRow {
    pub fn price(&self, model: ModelKind) -> Option<f64> {
        self.prices.get(&model).copied()
    }
}

/// In-memory sink holding every event and anomaly.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Vec<PriceEvent>,
    anomalies: Vec<AnomalyRecord>,
    flushes: usize,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in emission order.
    pub fn events(&self) -> &[PriceEvent] {
        &self.events
    }

    pub fn anomalies(&self) -> &[AnomalyRecord] {
        &self.anomalies
    }

    /// Number of `flush` calls received.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Events for one model, in emission order.
    pub fn stream(&self, model: ModelKind) -> impl Iterator<Item = &PriceEvent> {
        self.events.iter().filter(move |e| e.model == model)
    }

    /// One row per priced observation, joining the per-model events.
    pub fn joined(&self) -> Vec<JoinedRow> {
        let mut rows: Vec<JoinedRow> = Vec::new();

        for event in &self.events {
            let same_observation = rows.last().map_or(false, |row| {
                row.lot_id == event.lot_id
                    && row.timestamp == event.timestamp
                    && !row.prices.contains_key(&event.model)
            });

            if same_observation {
                if let Some(row) = rows.last_mut() {
                    row.prices.insert(event.model, event.price);
                }
            } else {
                let mut prices = BTreeMap::new();
                prices.insert(event.model, event.price);
                rows.push(JoinedRow {
                    timestamp: event.timestamp,
                    lot_id: event.lot_id.clone(),
                    occupancy_rate: event.occupancy_rate,
                    prices,
                });
            }
        }
        rows
    }

    pub fn into_parts(self) -> (Vec<PriceEvent>, Vec<AnomalyRecord>) {
        (self.events, self.anomalies)
    }
}

impl ResultsSink for CollectingSink {
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()> {
        self.events.extend_from_slice(events);
        Ok(())
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()> {
        self.anomalies.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
