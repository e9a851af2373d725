//! Gradient-boosted regression trees on logistic loss.
//!
//! Each round fits a tree to the current gradients `p - y` with hessians
//! `p (1 - p)`, and its leaves hold the Newton step `-G / (H + l2)`.

use serde::{Deserialize, Serialize};

use crate::domain::Label;
use crate::error::AppError;
use crate::math::{logit, sigmoid};

use super::learner::{Classifier, check_training_set};
use super::tree::{RegressionTree, SortedColumns, TreeBuilder, TreeParams};

const MIN_HESSIAN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Leaf-value regularisation.
    pub l2: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            l2: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    pub params: GbdtParams,
    /// Starting log-odds (training base rate).
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn new(params: GbdtParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
        }
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.params.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl Classifier for GradientBoostedTrees {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[Label]) -> Result<(), AppError> {
        check_training_set(rows, labels)?;
        if self.params.learning_rate <= 0.0 || !self.params.learning_rate.is_finite() {
            return Err(AppError::InvalidConfig("boosting learning rate must be > 0".into()));
        }

        let n = rows.len();
        let y: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let positive_rate = y.iter().sum::<f64>() / n as f64;
        self.base_score = logit(positive_rate);
        self.trees.clear();

        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_leaf: self.params.min_samples_leaf,
        };
        let sorted = SortedColumns::new(rows);
        let mut scores = vec![self.base_score; n];
        let mut gradients = vec![0.0; n];
        let mut hessians = vec![0.0; n];

        for round in 0..self.params.rounds {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                gradients[i] = p - y[i];
                hessians[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let tree = TreeBuilder::new(rows, &gradients, &hessians, &sorted, tree_params, self.params.l2).build();
            for (s, row) in scores.iter_mut().zip(rows.iter()) {
                *s += self.params.learning_rate * tree.predict(row);
            }
            if scores.iter().any(|s| !s.is_finite()) {
                return Err(AppError::Numerical(format!(
                    "gradient boosting diverged at round {round}"
                )));
            }
            self.trees.push(tree);
        }

        tracing::debug!(rounds = self.trees.len(), "fitted gradient-boosted trees");
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn log_loss(model: &GradientBoostedTrees, rows: &[Vec<f64>], labels: &[Label]) -> f64 {
        rows.iter()
            .zip(labels.iter())
            .map(|(r, &l)| {
                let p = model.predict_proba(r).clamp(1e-12, 1.0 - 1e-12);
                if l == 1 { -p.ln() } else { -(1.0 - p).ln() }
            })
            .sum::<f64>()
            / rows.len() as f64
    }

    #[test]
    fn fits_a_nonlinear_region() {
        let mut rng = StdRng::seed_from_u64(5);
        let rows: Vec<Vec<f64>> = (0..300)
            .map(|_| vec![rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0)])
            .collect();
        // Positive inside a ring; no linear separator exists.
        let labels: Vec<Label> = rows
            .iter()
            .map(|r| u8::from((r[0] * r[0] + r[1] * r[1]).sqrt() < 1.2))
            .collect();

        let mut model = GradientBoostedTrees::new(GbdtParams::default());
        model.fit(&rows, &labels).unwrap();

        let correct = rows
            .iter()
            .zip(labels.iter())
            .filter(|(r, l)| u8::from(model.predict_proba(r) >= 0.5) == **l)
            .count();
        assert!(correct as f64 / 300.0 > 0.9, "accuracy {correct}/300");
    }

    #[test]
    fn more_rounds_lower_training_loss() {
        let mut rng = StdRng::seed_from_u64(6);
        let rows: Vec<Vec<f64>> = (0..200).map(|_| vec![rng.gen_range(0.0..1.0)]).collect();
        let labels: Vec<Label> = rows.iter().map(|r| u8::from(r[0] > 0.3 && r[0] < 0.7)).collect();

        let short = GbdtParams {
            rounds: 5,
            ..GbdtParams::default()
        };
        let mut a = GradientBoostedTrees::new(short);
        a.fit(&rows, &labels).unwrap();
        let mut b = GradientBoostedTrees::new(GbdtParams::default());
        b.fit(&rows, &labels).unwrap();

        assert!(log_loss(&b, &rows, &labels) < log_loss(&a, &rows, &labels));
    }

    #[test]
    fn zero_rounds_predicts_base_rate() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let labels: Vec<Label> = (0..10).map(|i| u8::from(i < 3)).collect();
        let mut model = GradientBoostedTrees::new(GbdtParams {
            rounds: 0,
            ..GbdtParams::default()
        });
        model.fit(&rows, &labels).unwrap();
        assert!((model.predict_proba(&[100.0]) - 0.3).abs() < 1e-9);
    }
}
