//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - raw inputs (`RawValue`, `RawRecord`) and field contracts (`FieldSpec`)
//! - scoring outputs (`PredictionResult`, `ConfidenceTier`)
//! - run configuration (`TrainConfig`, `BaseLearnerKind`, `ConfidenceThresholds`)

pub mod types;

pub use types::*;
