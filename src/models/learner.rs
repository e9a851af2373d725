//! The fit / predict capability shared by every learner, and the closed set of
//! base learners selectable from configuration.

use serde::{Deserialize, Serialize};

use crate::domain::{BaseLearnerKind, Label};
use crate::error::AppError;

use super::gbdt::{GbdtParams, GradientBoostedTrees};
use super::logistic::{LogisticParams, LogisticRegression};
use super::tree::{DecisionTree, RegressionTree, TreeParams};

/// A binary classifier producing `P(label = 1)`.
pub trait Classifier {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[Label]) -> Result<(), AppError>;

    fn predict_proba(&self, row: &[f64]) -> f64;

    fn predict_all(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }
}

/// Hyper-parameters for every learner the stack can build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerParams {
    pub logistic: LogisticParams,
    pub tree: TreeParams,
    pub gbdt: GbdtParams,
    /// The stacking layer.
    pub meta: LogisticParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BaseLearner {
    Logistic(LogisticRegression),
    Gbdt(GradientBoostedTrees),
    Tree(DecisionTree),
}

impl BaseLearner {
    /// Untrained learner of the given kind.
    pub fn new(kind: BaseLearnerKind, params: &LearnerParams) -> Self {
        match kind {
            BaseLearnerKind::Logistic => BaseLearner::Logistic(LogisticRegression::new(params.logistic)),
            BaseLearnerKind::Gbdt => BaseLearner::Gbdt(GradientBoostedTrees::new(params.gbdt)),
            BaseLearnerKind::Tree => BaseLearner::Tree(DecisionTree::new(params.tree)),
        }
    }

    pub fn kind(&self) -> BaseLearnerKind {
        match self {
            BaseLearner::Logistic(_) => BaseLearnerKind::Logistic,
            BaseLearner::Gbdt(_) => BaseLearnerKind::Gbdt,
            BaseLearner::Tree(_) => BaseLearnerKind::Tree,
        }
    }

    /// Whether the fitted learner can read rows of `width` columns. Logistic
    /// weights pin the width exactly; trees only need every split column to
    /// exist.
    pub fn accepts_width(&self, width: usize) -> bool {
        let splits_fit = |tree: &RegressionTree| tree.max_feature().is_none_or(|f| f < width);
        match self {
            BaseLearner::Logistic(m) => m.coefficients.len() == width + 1,
            BaseLearner::Gbdt(m) => m.trees.iter().all(splits_fit),
            BaseLearner::Tree(m) => splits_fit(&m.tree),
        }
    }
}

impl Classifier for BaseLearner {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[Label]) -> Result<(), AppError> {
        match self {
            BaseLearner::Logistic(m) => m.fit(rows, labels),
            BaseLearner::Gbdt(m) => m.fit(rows, labels),
            BaseLearner::Tree(m) => m.fit(rows, labels),
        }
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        match self {
            BaseLearner::Logistic(m) => m.predict_proba(row),
            BaseLearner::Gbdt(m) => m.predict_proba(row),
            BaseLearner::Tree(m) => m.predict_proba(row),
        }
    }
}

/// Shape checks common to every learner. Returns the row width.
pub(crate) fn check_training_set(rows: &[Vec<f64>], labels: &[Label]) -> Result<usize, AppError> {
    if rows.is_empty() {
        return Err(AppError::DataSufficiency("cannot fit a learner on zero rows".into()));
    }
    if rows.len() != labels.len() {
        return Err(AppError::InvalidConfig(format!(
            "{} rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(AppError::InvalidConfig("rows have inconsistent widths".into()));
    }
    if let Some(bad) = labels.iter().find(|&&l| l > 1) {
        return Err(AppError::InvalidConfig(format!("label {bad} is not binary")));
    }
    Ok(width)
}
