//! Streaming pricing engine for the parking pricing system.
//!
//! This crate handles:
//! - Per-model lot state and neighbor lookup
//! - Ordered, atomic replay of observations through every active model
//! - Results sinks (in-memory, CSV, JSON lines, SQLite)
//! - Run counters and price reports

pub mod engine;
pub mod export;
pub mod sink;
pub mod state;
pub mod summary;

pub use engine::{EngineState, PricingEngine, StopHandle};
pub use export::{CsvExporter, JsonLinesSink, SqliteSink};
pub use sink::{CollectingSink, FanoutSink, JoinedRow, NullSink, ResultsSink};
pub use state::LotStateStore;
pub use summary::{LotSummary, ModelStats, PriceReport, RunSummary};
