//! L2-regularised logistic regression fitted by iteratively reweighted least
//! squares. Each Newton step is one weighted ridge solve (see `math::ols`).

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::Label;
use crate::error::AppError;
use crate::math::{sigmoid, solve_weighted_ridge};

use super::learner::{Classifier, check_training_set};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub l2: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            l2: 1e-2,
            max_iter: 50,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub params: LogisticParams,
    /// Intercept first, then one weight per input column.
    pub coefficients: Vec<f64>,
}

impl LogisticRegression {
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            coefficients: Vec::new(),
        }
    }

    fn linear(&self, row: &[f64]) -> f64 {
        match self.coefficients.split_first() {
            Some((b0, w)) => b0 + w.iter().zip(row.iter()).map(|(a, b)| a * b).sum::<f64>(),
            None => 0.0,
        }
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, rows: &[Vec<f64>], labels: &[Label]) -> Result<(), AppError> {
        let width = check_training_set(rows, labels)?;
        let n = rows.len();
        let p = width + 1;

        let x = DMatrix::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { rows[i][j - 1] });
        let y = DVector::from_iterator(n, labels.iter().map(|&l| f64::from(l)));
        let mut beta = DVector::<f64>::zeros(p);

        let mut converged = false;
        let mut iterations = 0;
        for _ in 0..self.params.max_iter {
            iterations += 1;
            let eta = &x * &beta;
            let mut weights = DVector::<f64>::zeros(n);
            let mut working = DVector::<f64>::zeros(n);
            for i in 0..n {
                let mu = sigmoid(eta[i]);
                let w = (mu * (1.0 - mu)).max(1e-10);
                weights[i] = w;
                working[i] = eta[i] + (y[i] - mu) / w;
            }

            let next = solve_weighted_ridge(&x, &working, &weights, self.params.l2).ok_or_else(|| {
                AppError::Numerical("logistic regression: weighted least squares did not converge".into())
            })?;
            if !next.iter().all(|v| v.is_finite()) {
                return Err(AppError::Numerical(
                    "logistic regression produced non-finite coefficients".into(),
                ));
            }

            let delta = (&next - &beta).amax();
            beta = next;
            if delta < self.params.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::debug!(iterations, "logistic regression stopped at iteration cap");
        }
        self.coefficients = beta.iter().copied().collect();
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.linear(row))
    }
}
