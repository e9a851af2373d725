//! Stratified K-fold assignment.
//!
//! Each class is shuffled with the run seed and dealt round-robin across the
//! folds, continuing from where the previous class stopped, so every fold keeps
//! the overall class ratio (to within one row per class) and fold sizes differ
//! by at most one.

use rand::prelude::*;
use rand::rngs::StdRng;

use crate::domain::Label;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct Folds {
    k: usize,
    /// Fold id of every row.
    assignment: Vec<usize>,
}

impl Folds {
    pub fn stratified(labels: &[Label], k: usize, seed: u64) -> Result<Self, AppError> {
        if k < 2 {
            return Err(AppError::InvalidConfig(format!("need at least 2 folds, got {k}")));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut assignment = vec![0; labels.len()];
        let mut next = 0;

        for class in [0, 1] {
            let mut members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|&(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();
            if members.len() < k {
                return Err(AppError::DataSufficiency(format!(
                    "class {class} has {} member(s); {k} stratified folds need at least {k}",
                    members.len()
                )));
            }
            members.shuffle(&mut rng);
            for idx in members {
                assignment[idx] = next;
                next = (next + 1) % k;
            }
        }

        Ok(Self { k, assignment })
    }

    pub fn count(&self) -> usize {
        self.k
    }

    pub fn fold_of(&self, row: usize) -> usize {
        self.assignment[row]
    }

    /// Rows held out in `fold`, ascending.
    pub fn test_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.assignment.len()).filter(|&i| self.assignment[i] == fold).collect()
    }

    /// Rows used for training when `fold` is held out, ascending.
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.assignment.len()).filter(|&i| self.assignment[i] != fold).collect()
    }
}
