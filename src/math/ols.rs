//! Weighted least squares solver.
//!
//! Logistic regression is fitted by iteratively reweighted least squares, so we
//! repeatedly solve small problems of the form:
//!
//! ```text
//! minimize Σ w_i (z_i - x_i^T β)^2 + λ Σ_{j>=1} β_j^2
//! ```
//!
//! Implementation choices:
//! - Rows are scaled by `sqrt(w_i)` and the ridge term is appended as extra
//!   rows `sqrt(λ) e_j`, which turns the problem into ordinary least squares.
//! - We solve with SVD so tall and nearly collinear designs stay stable.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Column 0 is the intercept and is never penalised.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve a weighted, ridge-penalised least squares problem.
///
/// `x` must already contain the intercept column at index 0.
pub fn solve_weighted_ridge(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    w: &DVector<f64>,
    l2: f64,
) -> Option<DVector<f64>> {
    let (n, p) = x.shape();
    if y.len() != n || w.len() != n {
        return None;
    }

    let penalised = if l2 > 0.0 { p.saturating_sub(1) } else { 0 };
    let mut xa = DMatrix::<f64>::zeros(n + penalised, p);
    let mut ya = DVector::<f64>::zeros(n + penalised);

    for i in 0..n {
        let sw = w[i].max(0.0).sqrt();
        for j in 0..p {
            xa[(i, j)] = x[(i, j)] * sw;
        }
        ya[i] = y[i] * sw;
    }

    let s = l2.max(0.0).sqrt();
    for j in 0..penalised {
        xa[(n + j, j + 1)] = s;
    }

    solve_least_squares(&xa, &ya)
}
