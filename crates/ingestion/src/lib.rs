//! Data ingestion and normalization for the parking pricing system.
//!
//! This crate handles:
//! - Column-name mapping onto the canonical observation schema
//! - Categorical parsing (vehicle type, traffic level, booleans)
//! - Date + time composition
//! - Restartable observation sources (CSV, in-memory)

pub mod normalizer;
pub mod source;

pub use normalizer::{BoundColumns, ColumnMapping, RecordNormalizer};
pub use source::{CsvSource, MemorySource, ObservationIter, ObservationSource};
