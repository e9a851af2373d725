//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - deserialized straight from scoring requests and CSV rows
//! - embedded in the artifact bundle
//! - printed as JSON responses

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::LearnerParams;

/// Binary target. `1` = attrition, `0` = retained.
pub type Label = u8;

pub const ATTRITION: Label = 1;
pub const RETAINED: Label = 0;

/// One raw field value as received from a request or a CSV cell.
///
/// CSV cells always arrive as `Text`; JSON requests may carry real numbers.
/// Any other JSON value (null, bool, array, object) lands in `Other` so the
/// validator can report it against its field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawValue {
    /// Numeric view of the value, parsing text if needed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Int(v) => Some(*v as f64),
            RawValue::Float(v) => Some(*v),
            RawValue::Text(s) => s.trim().parse::<f64>().ok(),
            RawValue::Other(_) => None,
        }
        .filter(|v| v.is_finite())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Unquoted form for CSV cells.
    pub fn to_cell(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Int(v) => write!(f, "{v}"),
            RawValue::Float(v) => write!(f, "{v}"),
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// One employee observation: field name -> raw value.
pub type RawRecord = BTreeMap<String, RawValue>;

/// Semantic type and admissible values of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Whole number within `[min, max]`.
    BoundedInt { min: i64, max: i64 },
    /// Real number within `[min, max]`.
    BoundedFloat { min: f64, max: f64 },
    /// Closed string enumeration.
    Category { allowed: Vec<String> },
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldKind::Category { .. })
    }
}

/// Per-field contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn int(name: &str, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::BoundedInt { min, max },
        }
    }

    pub fn float(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::BoundedFloat { min, max },
        }
    }

    pub fn category(name: &str, allowed: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Category {
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

/// Discretized confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability cut-offs used by the scoring service.
///
/// Tiers use strict `>`: `p > high` is high, `p > medium` is medium, anything
/// else is low. The decision uses `p >= decision`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub decision: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            decision: 0.5,
            high: 0.6,
            medium: 0.3,
        }
    }
}

impl ConfidenceThresholds {
    pub fn validate(&self) -> Result<(), AppError> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !(in_unit(self.decision) && in_unit(self.high) && in_unit(self.medium)) {
            return Err(AppError::InvalidConfig(format!(
                "thresholds must lie in [0, 1] (decision={}, high={}, medium={})",
                self.decision, self.high, self.medium
            )));
        }
        if self.medium >= self.high {
            return Err(AppError::InvalidConfig(format!(
                "medium threshold {} must be below high threshold {}",
                self.medium, self.high
            )));
        }
        Ok(())
    }

    pub fn tier(&self, probability: f64) -> ConfidenceTier {
        if probability > self.high {
            ConfidenceTier::High
        } else if probability > self.medium {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn decide(&self, probability: f64) -> bool {
        probability >= self.decision
    }
}

/// Output of one scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// `true` = predicted to leave.
    pub decision: bool,
    pub probability: f64,
    pub confidence: ConfidenceTier,
}

/// Closed set of base learners the ensemble can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BaseLearnerKind {
    /// L2-regularised logistic regression.
    Logistic,
    /// Gradient-boosted regression trees on logistic loss.
    Gbdt,
    /// Single CART decision tree.
    Tree,
}

impl BaseLearnerKind {
    pub const DEFAULT_SET: [BaseLearnerKind; 3] = [
        BaseLearnerKind::Logistic,
        BaseLearnerKind::Gbdt,
        BaseLearnerKind::Tree,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            BaseLearnerKind::Logistic => "logistic",
            BaseLearnerKind::Gbdt => "gbdt",
            BaseLearnerKind::Tree => "tree",
        }
    }
}

/// Knobs for one training run, as understood by the pipeline.
///
/// Derived from CLI flags (plus defaults); contains no paths.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Stratified folds used to build out-of-fold meta-features.
    pub folds: usize,
    /// Neighbour count for synthetic minority oversampling.
    pub neighbours: usize,
    /// Principal components retained.
    pub components: usize,
    pub seed: u64,
    pub learners: Vec<BaseLearnerKind>,
    pub params: LearnerParams,
    pub thresholds: ConfidenceThresholds,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            folds: 10,
            neighbours: 5,
            components: 23,
            seed: 42,
            learners: BaseLearnerKind::DEFAULT_SET.to_vec(),
            params: LearnerParams::default(),
            thresholds: ConfidenceThresholds::default(),
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.folds < 2 {
            return Err(AppError::InvalidConfig("fold count must be >= 2".into()));
        }
        if self.neighbours == 0 {
            return Err(AppError::InvalidConfig("neighbour count must be >= 1".into()));
        }
        if self.components == 0 {
            return Err(AppError::InvalidConfig("component count must be >= 1".into()));
        }
        if self.learners.is_empty() {
            return Err(AppError::InvalidConfig("at least one base learner is required".into()));
        }
        for (i, kind) in self.learners.iter().enumerate() {
            if self.learners[..i].contains(kind) {
                return Err(AppError::InvalidConfig(format!(
                    "base learner `{}` listed twice",
                    kind.display_name()
                )));
            }
        }
        self.thresholds.validate()
    }
}
