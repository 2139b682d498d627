//! Valscore Engine
//!
//! Turns raw financial records into comparable, risk-adjusted scores and a
//! discrete recommendation (STRONG_BUY / BUY / HOLD / SELL).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         valscore-engine                            │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  source ──► quality ──► percentile ──► valuation ──► scoring       │
//! │  (fetch)    (gate)      (sector rank)  (MoS)         (composite)   │
//! │                            ▲              ▲              │         │
//! │                      DistributionStore  regime        risk         │
//! │                                                          │         │
//! │                                            calibration ◄─┘         │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Percentile contextualization
//! - PER/PBR/ROE are ranked against sector peers, blended with the
//!   market-wide distribution when the sector sample is thin
//! - Ranks are oriented so that higher always means more attractive
//!
//! ## Justified multiples
//! - `g = ROE * b`, `P/B* = (ROE - g) / (r - g)`, `P/E* = (1 - b) / (r - g)`
//! - Margin of safety is the conservative gap between justified and observed
//!
//! ## Downgrade-only guards
//! - Risk deductions and hard guards move a recommendation at most one tier
//!   down from the base-score tier, never up

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod calibration;
pub mod error;
pub mod export;
pub mod model;
pub mod percentile;
pub mod quality;
pub mod regime;
pub mod risk;
pub mod scoring;
pub mod source;
pub mod valuation;

pub use calibration::{CalibrationHistory, CalibrationMonitor, CalibrationSnapshot};
pub use error::EngineError;
pub use export::{DataVersionStamp, ExportBundle, ExportRecord};
pub use model::{Recommendation, ScoreResult, StockRecord};
pub use percentile::{DistributionStore, PercentileContextualizer};
pub use quality::DataQualityGuard;
pub use regime::RegimeParameterProvider;
pub use risk::RiskFlagEvaluator;
pub use scoring::{BatchReport, BatchScorer, CompositeScorer, RecordScorer};
pub use source::{JsonFileSource, RecordAssembler, StaticRegimeSource};
pub use valuation::JustifiedValuationCalculator;
