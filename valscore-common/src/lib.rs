//! Valscore Common - Shared configuration, validation, errors and logging.
//!
//! This crate provides:
//! - Configuration types and loading (with modular files and env overrides)
//! - Configuration validation (operator errors are surfaced, never clamped)
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers
//! - Small numeric and path utilities shared by the engine

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    BatchConfig, Bounds, CalibrationConfig, Config, DataQualityConfig, ObservabilityConfig,
    OutputConfig, PercentileConfig, RegimeConfig, RegimeDefaults, RiskConfig, ScoreWeights,
    ScoringConfig, TierTargets, TierThresholds, ValuationConfig, MAX_CONCURRENCY,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
