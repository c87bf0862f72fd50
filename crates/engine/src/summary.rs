//! Run counters and price reports.

use std::collections::BTreeMap;
use std::fmt;

use ordered_float::OrderedFloat;
use parking_core::{format_ts, LotId, ModelKind, PriceEvent, StabilizerConfig, TimestampMs};
use serde::Serialize;

/// Counters accumulated over one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Observations pulled from the source, including rejected ones.
    pub observations_read: u64,
    /// Observations priced by every active model.
    pub observations_priced: u64,
    /// Skipped for failing validation.
    pub validation_skipped: u64,
    /// Skipped for arriving behind the lot's last commit.
    pub ordering_violations: u64,
    /// Priced with occupancy clamped to capacity.
    pub occupancy_clamped: u64,
    /// Priced with zero capacity.
    pub zero_capacity: u64,
    /// Events whose candidate overflowed and was replaced by the floor.
    pub overflow_clamped: u64,
    /// Events bound by the step limit.
    pub step_limited: u64,
    /// Events whose candidate fell outside `[min_price, max_price]`.
    pub bound_clamped: u64,
    /// Events emitted per model.
    pub events: BTreeMap<ModelKind, u64>,
    /// Distinct lots priced.
    pub lots: usize,
    pub first_timestamp: Option<TimestampMs>,
    pub last_timestamp: Option<TimestampMs>,
    /// Run ended by a stop request before the source was exhausted.
    pub stopped_early: bool,
}

impl RunSummary {
    /// Observations that did not produce events.
    pub fn skipped(&self) -> u64 {
        self.validation_skipped + self.ordering_violations
    }

    pub fn total_events(&self) -> u64 {
        self.events.values().sum()
    }

    pub(crate) fn note_timestamp(&mut self, ts: TimestampMs) {
        self.first_timestamp = Some(self.first_timestamp.map_or(ts, |f| f.min(ts)));
        self.last_timestamp = Some(self.last_timestamp.map_or(ts, |l| l.max(ts)));
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Observations read:     {}", self.observations_read)?;
        writeln!(f, "Observations priced:   {}", self.observations_priced)?;
        writeln!(f, "Validation skipped:    {}", self.validation_skipped)?;
        writeln!(f, "Ordering violations:   {}", self.ordering_violations)?;
        writeln!(f, "Occupancy clamped:     {}", self.occupancy_clamped)?;
        writeln!(f, "Zero capacity:         {}", self.zero_capacity)?;
        writeln!(f, "Overflow clamped:      {}", self.overflow_clamped)?;
        writeln!(f, "Step limited:          {}", self.step_limited)?;
        writeln!(f, "Bound clamped:         {}", self.bound_clamped)?;
        writeln!(f, "Lots:                  {}", self.lots)?;
        if let (Some(first), Some(last)) = (self.first_timestamp, self.last_timestamp) {
            writeln!(f, "Time range:            {} .. {}", format_ts(first), format_ts(last))?;
        }
        for (model, count) in &self.events {
            writeln!(f, "Events ({:<11}):  {}", model.as_str(), count)?;
        }
        if self.stopped_early {
            writeln!(f, "Stopped early")?;
        }
        Ok(())
    }
}

/// Price distribution for one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStats {
    pub model: ModelKind,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 with fewer than two prices.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Prices outside `[min_price, max_price]`. Always 0 for a correct run.
    pub bound_violations: usize,
    pub anomalous: usize,
}

/// Average prices for one lot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotSummary {
    pub lot_id: LotId,
    pub avg_occupancy: f64,
    pub avg_price: BTreeMap<ModelKind, f64>,
}

/// Post-run statistics over emitted events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceReport {
    pub models: Vec<ModelStats>,
    pub lots: Vec<LotSummary>,
}

impl PriceReport {
    /// Compute statistics over `events`, checking prices against the bounds.
    pub fn from_events(events: &[PriceEvent], bounds: &StabilizerConfig) -> Self {
        let mut by_model: BTreeMap<ModelKind, Vec<&PriceEvent>> = BTreeMap::new();
        for event in events {
            by_model.entry(event.model).or_default().push(event);
        }

        let models = by_model
            .into_iter()
            .map(|(model, events)| model_stats(model, &events, bounds))
            .collect();

        Self {
            models,
            lots: lot_summaries(events),
        }
    }

    pub fn model(&self, model: ModelKind) -> Option<&ModelStats> {
        self.models.iter().find(|m| m.model == model)
    }

    pub fn lot(&self, lot_id: &str) -> Option<&LotSummary> {
        self.lots.iter().find(|l| l.lot_id == lot_id)
    }

    pub fn bound_violations(&self) -> usize {
        self.models.iter().map(|m| m.bound_violations).sum()
    }
}

fn model_stats(model: ModelKind, events: &[&PriceEvent], bounds: &StabilizerConfig) -> ModelStats {
    let prices: Vec<f64> = events.iter().map(|e| e.price).collect();
    let max_price = bounds.max_price.unwrap_or(f64::INFINITY);
    let eps = 1e-9;

    let std_dev = if prices.len() > 1 {
        sample_std_dev(&prices)
    } else {
        0.0
    };

    ModelStats {
        model,
        count: prices.len(),
        mean: mean(&prices),
        std_dev,
        min: prices
            .iter()
            .copied()
            .map(OrderedFloat)
            .min()
            .map_or(f64::NAN, |p| p.0),
        max: prices
            .iter()
            .copied()
            .map(OrderedFloat)
            .max()
            .map_or(f64::NAN, |p| p.0),
        bound_violations: prices
            .iter()
            .filter(|&&p| p < bounds.min_price - eps || p > max_price + eps)
            .count(),
        anomalous: events.iter().filter(|e| e.anomalous).count(),
    }
}

// Statistics also defines min/max, so keep it out of scope of iterator code.
fn mean(values: &[f64]) -> f64 {
    use statrs::statistics::Statistics;
    values.iter().mean()
}

fn sample_std_dev(values: &[f64]) -> f64 {
    use statrs::statistics::Statistics;
    values.iter().std_dev()
}

fn lot_summaries(events: &[PriceEvent]) -> Vec<LotSummary> {
    #[derive(Default)]
    struct Acc {
        occupancy: Vec<f64>,
        prices: BTreeMap<ModelKind, Vec<f64>>,
    }

    let mut lots: BTreeMap<&str, Acc> = BTreeMap::new();
    for event in events {
        let acc = lots.entry(event.lot_id.as_str()).or_default();
        acc.occupancy.push(event.occupancy_rate);
        acc.prices.entry(event.model).or_default().push(event.price);
    }

    lots.into_iter()
        .map(|(lot_id, acc)| LotSummary {
            lot_id: lot_id.to_string(),
            avg_occupancy: mean(&acc.occupancy),
            avg_price: acc
                .prices
                .into_iter()
                .map(|(model, prices)| (model, mean(&prices)))
                .collect(),
        })
        .collect()
}

impl fmt::Display for PriceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:>7} {:>8} {:>8} {:>8} {:>8} {:>6}",
            "model", "count", "mean", "std", "min", "max", "oob"
        )?;
        for m in &self.models {
            writeln!(
                f,
                "{:<12} {:>7} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>6}",
                m.model.as_str(),
                m.count,
                m.mean,
                m.std_dev,
                m.min,
                m.max,
                m.bound_violations
            )?;
        }

        if !self.lots.is_empty() {
            writeln!(f)?;
            write!(f, "{:<16} {:>9}", "lot", "occupancy")?;
            for m in &self.models {
                write!(f, " {:>12}", m.model.as_str())?;
            }
            writeln!(f)?;
            for lot in &self.lots {
                write!(f, "{:<16} {:>9.3}", lot.lot_id, lot.avg_occupancy)?;
                for m in &self.models {
                    match lot.avg_price.get(&m.model) {
                        Some(p) => write!(f, " {:>12.2}", p)?,
                        None => write!(f, " {:>12}", "-")?,
                    }
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
