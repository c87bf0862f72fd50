//! Core types and configuration for the parking pricing system.
//!
//! This crate provides shared types used across all other crates:
//! - Observation, lot state and price event types
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    BaselineConfig, CompetitiveConfig, Config, DemandConfig, DemandWeights, EngineConfig,
    PricingConfig, ReplayOrdering, StabilizerConfig, VehicleWeights,
};
pub use error::{Error, Result};
pub use types::*;
