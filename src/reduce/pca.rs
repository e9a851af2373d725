//! Principal component projection.
//!
//! `fit` centres the matrix, forms the sample covariance, and keeps the
//! eigenvectors with the largest eigenvalues. Each kept component is flipped so
//! its largest-magnitude loading is positive; eigen solvers are free to return
//! either sign and we want identical artifacts across runs.

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Fixed-length projection of an encoded vector.
pub type ReducedVector = Vec<f64>;

/// Fitted reducer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerArtifact {
    pub run_id: String,
    /// Encoded width this reducer was fitted on.
    pub input_width: usize,
    /// Per-column mean used for centring.
    pub mean: Vec<f64>,
    /// One row per component, each of length `input_width`.
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl ReducerArtifact {
    pub fn output_width(&self) -> usize {
        self.components.len()
    }

    /// Share of total variance kept by the retained components.
    pub fn retained_variance(&self) -> f64 {
        self.explained_variance_ratio.iter().sum()
    }

    pub fn transform(&self, vector: &[f64]) -> Result<ReducedVector, AppError> {
        if vector.len() != self.input_width {
            return Err(AppError::ArtifactVersion(format!(
                "reducer expects vectors of width {}, got {}",
                self.input_width,
                vector.len()
            )));
        }
        Ok(self
            .components
            .iter()
            .map(|component| {
                component
                    .iter()
                    .zip(vector.iter().zip(self.mean.iter()))
                    .map(|(c, (x, m))| c * (x - m))
                    .sum()
            })
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<ReducedVector>, AppError> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

pub struct DimensionalityReducer;

impl DimensionalityReducer {
    /// Fit `n_components` principal components on `rows`.
    pub fn fit(rows: &[Vec<f64>], n_components: usize) -> Result<ReducerArtifact, AppError> {
        let n = rows.len();
        if n < 2 {
            return Err(AppError::DataSufficiency(format!(
                "principal components need at least 2 rows, got {n}"
            )));
        }
        let d = rows[0].len();
        if rows.iter().any(|r| r.len() != d) {
            return Err(AppError::InvalidConfig("rows have inconsistent widths".into()));
        }
        if n_components == 0 || n_components > d {
            return Err(AppError::DataSufficiency(format!(
                "cannot keep {n_components} components from an encoded width of {d}"
            )));
        }

        let mean: Vec<f64> = (0..d)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n as f64)
            .collect();
        let centred = DMatrix::from_fn(n, d, |i, j| rows[i][j] - mean[j]);
        let cov = (centred.transpose() * &centred) / (n as f64 - 1.0);

        let eig = SymmetricEigen::new(cov);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| {
            eig.eigenvalues[b]
                .partial_cmp(&eig.eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let total: f64 = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let mut components = Vec::with_capacity(n_components);
        let mut explained_variance = Vec::with_capacity(n_components);
        let mut explained_variance_ratio = Vec::with_capacity(n_components);

        for &idx in order.iter().take(n_components) {
            let mut component: Vec<f64> = eig.eigenvectors.column(idx).iter().copied().collect();
            if !component.iter().all(|v| v.is_finite()) {
                return Err(AppError::Numerical(
                    "eigen decomposition produced non-finite loadings".into(),
                ));
            }
            flip_sign(&mut component);

            let variance = eig.eigenvalues[idx].max(0.0);
            components.push(component);
            explained_variance.push(variance);
            explained_variance_ratio.push(if total > 0.0 { variance / total } else { 0.0 });
        }

        let artifact = ReducerArtifact {
            run_id: String::new(),
            input_width: d,
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        };
        tracing::info!(
            components = n_components,
            input_width = d,
            retained = artifact.retained_variance(),
            "fitted principal components"
        );
        Ok(artifact)
    }
}

fn flip_sign(component: &mut [f64]) {
    let mut pivot = 0;
    for (i, v) in component.iter().enumerate() {
        if v.abs() > component[pivot].abs() {
            pivot = i;
        }
    }
    if component[pivot] < 0.0 {
        component.iter_mut().for_each(|v| *v = -*v);
    }
}
