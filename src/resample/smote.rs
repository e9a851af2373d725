//! Synthetic minority oversampling.
//!
//! For every minority sample we precompute its `k` nearest minority neighbours
//! (Euclidean distance in encoded space). New samples are produced by walking a
//! seeded permutation of the minority class, picking one of the current
//! sample's neighbours at random, and interpolating between the two with a
//! uniform fraction in `[0, 1]`. The walk cycles until both classes have the
//! same count.
//!
//! Output rows keep the originals first (input order) followed by the
//! synthetic rows, and every synthetic row records where it came from.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::Label;
use crate::error::AppError;
use crate::math::squared_distance;

#[derive(Debug, Clone, Copy)]
pub struct SmoteParams {
    /// Requested neighbour count. Reduced to `members - 1` for tiny classes.
    pub neighbours: usize,
    pub seed: u64,
}

impl Default for SmoteParams {
    fn default() -> Self {
        Self {
            neighbours: 5,
            seed: 42,
        }
    }
}

/// Where a synthetic row came from (indices into the input rows).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Provenance {
    pub base: usize,
    pub neighbour: usize,
    pub gap: f64,
}

#[derive(Debug, Clone)]
pub struct Resampled {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<Label>,
    /// One entry per synthetic row; `synthetic[i]` describes `rows[original_len + i]`.
    pub synthetic: Vec<Provenance>,
    pub original_len: usize,
    /// Neighbour count actually used (after any reduction).
    pub neighbours_used: usize,
}

/// Balance a binary dataset by synthesizing minority-class rows.
pub fn oversample_minority(
    rows: &[Vec<f64>],
    labels: &[Label],
    params: SmoteParams,
) -> Result<Resampled, AppError> {
    if rows.len() != labels.len() {
        return Err(AppError::InvalidConfig(format!(
            "{} rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }

    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(AppError::DataSufficiency(format!(
            "resampling needs both classes (attrition={positives}, retained={negatives})"
        )));
    }

    let mut out = Resampled {
        rows: rows.to_vec(),
        labels: labels.to_vec(),
        synthetic: Vec::new(),
        original_len: rows.len(),
        neighbours_used: 0,
    };
    if positives == negatives {
        return Ok(out);
    }

    let (minority_label, needed) = if positives < negatives {
        (1, negatives - positives)
    } else {
        (0, positives - negatives)
    };
    let minority: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|&(_, &l)| l == minority_label)
        .map(|(i, _)| i)
        .collect();

    if minority.len() < 2 {
        return Err(AppError::DataSufficiency(format!(
            "minority class {minority_label} has {} member(s); at least 2 are needed to interpolate",
            minority.len()
        )));
    }

    let k = params.neighbours.min(minority.len() - 1).max(1);
    if k < params.neighbours {
        tracing::warn!(
            requested = params.neighbours,
            used = k,
            members = minority.len(),
            "minority class too small; reducing neighbour count"
        );
    }
    out.neighbours_used = k;

    let neighbours = nearest_neighbours(rows, &minority, k);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut order: Vec<usize> = (0..minority.len()).collect();
    order.shuffle(&mut rng);

    out.rows.reserve(needed);
    out.labels.reserve(needed);
    out.synthetic.reserve(needed);

    for step in 0..needed {
        let pos = order[step % order.len()];
        let nb = neighbours[pos][rng.gen_range(0..k)];
        let gap: f64 = rng.gen_range(0.0..=1.0);

        let base = &rows[minority[pos]];
        let other = &rows[minority[nb]];
        let row: Vec<f64> = base
            .iter()
            .zip(other.iter())
            .map(|(a, b)| a + gap * (b - a))
            .collect();

        out.rows.push(row);
        out.labels.push(minority_label);
        out.synthetic.push(Provenance {
            base: minority[pos],
            neighbour: minority[nb],
            gap,
        });
    }

    tracing::info!(
        minority = minority_label,
        before = minority.len(),
        synthesized = needed,
        neighbours = k,
        "oversampled minority class"
    );
    Ok(out)
}

/// `k` nearest minority neighbours for every minority member, as positions
/// into `members`. Ties break on the lower position.
fn nearest_neighbours(rows: &[Vec<f64>], members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .par_iter()
        .enumerate()
        .map(|(pos, &row_idx)| {
            let mut dists: Vec<(f64, usize)> = members
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != pos)
                .map(|(other, &other_idx)| (squared_distance(&rows[row_idx], &rows[other_idx]), other))
                .collect();
            dists.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });
            dists.into_iter().take(k).map(|(_, other)| other).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::euclidean;

    fn imbalanced(n_major: usize, n_minor: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<Label>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..n_major {
            rows.push(vec![rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(0.0..1.0)]);
            labels.push(0);
        }
        for _ in 0..n_minor {
            rows.push(vec![rng.gen_range(2.0..6.0), rng.gen_range(2.0..6.0), rng.gen_range(0.0..1.0)]);
            labels.push(1);
        }
        (rows, labels)
    }

    #[test]
    fn balances_900_to_100() {
        let (rows, labels) = imbalanced(900, 100, 7);
        let out = oversample_minority(&rows, &labels, SmoteParams::default()).unwrap();

        let pos = out.labels.iter().filter(|&&l| l == 1).count();
        let neg = out.labels.iter().filter(|&&l| l == 0).count();
        assert_eq!((neg, pos), (900, 900));
        assert_eq!(out.rows.len(), 1800);
        assert_eq!(out.synthetic.len(), 800);
        assert_eq!(out.neighbours_used, 5);
        // Originals are untouched and come first.
        assert_eq!(&out.rows[..1000], &rows[..]);
    }

    #[test]
    fn synthetic_rows_lie_between_two_real_minority_rows() {
        let (rows, labels) = imbalanced(900, 100, 11);
        let out = oversample_minority(&rows, &labels, SmoteParams::default()).unwrap();

        for (i, prov) in out.synthetic.iter().enumerate() {
            let s = &out.rows[out.original_len + i];
            let a = &rows[prov.base];
            let b = &rows[prov.neighbour];
            assert_eq!(labels[prov.base], 1);
            assert_eq!(labels[prov.neighbour], 1);
            assert!((0.0..=1.0).contains(&prov.gap));

            let span = euclidean(a, b);
            assert!(euclidean(s, a) <= span + 1e-9);
            assert!(euclidean(s, b) <= span + 1e-9);
            assert!((euclidean(s, a) + euclidean(s, b) - span).abs() < 1e-9);
        }
    }

    #[test]
    fn same_seed_same_output() {
        let (rows, labels) = imbalanced(60, 10, 3);
        let params = SmoteParams { neighbours: 3, seed: 99 };
        let a = oversample_minority(&rows, &labels, params).unwrap();
        let b = oversample_minority(&rows, &labels, params).unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.synthetic, b.synthetic);

        let c = oversample_minority(&rows, &labels, SmoteParams { neighbours: 3, seed: 100 }).unwrap();
        assert_ne!(a.rows, c.rows);
    }

    #[test]
    fn tiny_minority_reduces_k_instead_of_failing() {
        let (rows, labels) = imbalanced(20, 3, 5);
        let out = oversample_minority(&rows, &labels, SmoteParams::default()).unwrap();
        assert_eq!(out.neighbours_used, 2);
        assert_eq!(out.labels.iter().filter(|&&l| l == 1).count(), 20);
    }

    #[test]
    fn single_member_minority_is_insufficient() {
        let (rows, labels) = imbalanced(20, 1, 5);
        let err = oversample_minority(&rows, &labels, SmoteParams::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn balanced_input_is_returned_unchanged() {
        let (rows, labels) = imbalanced(10, 10, 1);
        let out = oversample_minority(&rows, &labels, SmoteParams::default()).unwrap();
        assert_eq!(out.rows, rows);
        assert!(out.synthetic.is_empty());
    }

    #[test]
    fn majority_attrition_oversamples_retained_class() {
        let (rows, mut labels) = imbalanced(30, 12, 8);
        for l in labels.iter_mut() {
            *l = 1 - *l;
        }
        let out = oversample_minority(&rows, &labels, SmoteParams::default()).unwrap();
        assert_eq!(out.labels.iter().filter(|&&l| l == 0).count(), 30);
        assert!(out.labels[42..].iter().all(|&l| l == 0));
    }
}
