//! Stacked generalisation.
//!
//! The trainer moves through three states, one type each:
//!
//! 1. [`StackingTrainer`]: configuration only.
//! 2. [`CrossValidatedStack`]: out-of-fold probabilities for every base learner,
//!    an out-of-fold evaluation of the meta-learner over the same folds, and
//!    the resulting metrics.
//! 3. [`EnsembleArtifact`]: every learner refitted on the full training set,
//!    with the meta-learner fitted on the out-of-fold probability matrix.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{BaseLearnerKind, Label, TrainConfig};
use crate::error::AppError;
use crate::models::{BaseLearner, Classifier, LearnerParams, LogisticRegression};
use crate::report::ClassificationMetrics;

use super::folds::Folds;

/// Predict every row with a model that never saw it.
///
/// Folds are fitted in parallel; results are written back in row order so the
/// output does not depend on scheduling.
pub fn out_of_fold_probabilities<C, F>(
    rows: &[Vec<f64>],
    labels: &[Label],
    folds: &Folds,
    make: F,
) -> Result<Vec<f64>, AppError>
where
    C: Classifier,
    F: Fn() -> C + Sync,
{
    let per_fold: Vec<Vec<(usize, f64)>> = (0..folds.count())
        .into_par_iter()
        .map(|fold| -> Result<Vec<(usize, f64)>, AppError> {
            let train = folds.train_indices(fold);
            let train_rows: Vec<Vec<f64>> = train.iter().map(|&i| rows[i].clone()).collect();
            let train_labels: Vec<Label> = train.iter().map(|&i| labels[i]).collect();

            let mut model = make();
            model.fit(&train_rows, &train_labels)?;

            let held_out = folds.test_indices(fold);
            tracing::debug!(fold, train = train.len(), held_out = held_out.len(), "fold fitted");
            Ok(held_out
                .into_iter()
                .map(|i| (i, model.predict_proba(&rows[i])))
                .collect::<Vec<_>>())
        })
        .collect::<Result<_, AppError>>()?;

    let mut out = vec![0.0; rows.len()];
    for (i, p) in per_fold.into_iter().flatten() {
        out[i] = p;
    }
    Ok(out)
}

/// Metrics for one base learner's out-of-fold predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerMetrics {
    pub learner: BaseLearnerKind,
    pub metrics: ClassificationMetrics,
}

/// Stacked metrics restricted to one held-out fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub rows: usize,
    pub metrics: ClassificationMetrics,
}

/// Everything the cross-validation run measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub folds: usize,
    pub rows: usize,
    pub learners: Vec<LearnerMetrics>,
    pub stacked: ClassificationMetrics,
    pub per_fold: Vec<FoldMetrics>,
}

pub struct StackingTrainer {
    learners: Vec<BaseLearnerKind>,
    params: LearnerParams,
    folds: usize,
    seed: u64,
    decision: f64,
}

impl StackingTrainer {
    pub fn new(config: &TrainConfig) -> Self {
        Self {
            learners: config.learners.clone(),
            params: config.params.clone(),
            folds: config.folds,
            seed: config.seed,
            decision: config.thresholds.decision,
        }
    }

    pub fn cross_validate<'a>(
        self,
        rows: &'a [Vec<f64>],
        labels: &'a [Label],
    ) -> Result<CrossValidatedStack<'a>, AppError> {
        if self.learners.is_empty() {
            return Err(AppError::InvalidConfig("at least one base learner is required".into()));
        }
        if rows.len() != labels.len() {
            return Err(AppError::InvalidConfig(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let folds = Folds::stratified(labels, self.folds, self.seed)?;

        let mut base_oof = Vec::with_capacity(self.learners.len());
        let mut learner_metrics = Vec::with_capacity(self.learners.len());
        for &kind in &self.learners {
            let oof = out_of_fold_probabilities(rows, labels, &folds, || BaseLearner::new(kind, &self.params))?;
            let metrics = ClassificationMetrics::compute(&oof, labels, self.decision);
            tracing::info!(
                learner = kind.display_name(),
                auc = metrics.roc_auc,
                accuracy = metrics.accuracy,
                "out-of-fold base learner"
            );
            base_oof.push(oof);
            learner_metrics.push(LearnerMetrics {
                learner: kind,
                metrics,
            });
        }

        let meta_rows = meta_features(&base_oof, rows.len());
        let meta_params = self.params.meta;
        let stacked_oof =
            out_of_fold_probabilities(&meta_rows, labels, &folds, || LogisticRegression::new(meta_params))?;
        let stacked = ClassificationMetrics::compute(&stacked_oof, labels, self.decision);

        let per_fold = (0..folds.count())
            .map(|fold| {
                let idx = folds.test_indices(fold);
                let probs: Vec<f64> = idx.iter().map(|&i| stacked_oof[i]).collect();
                let truth: Vec<Label> = idx.iter().map(|&i| labels[i]).collect();
                FoldMetrics {
                    fold,
                    rows: idx.len(),
                    metrics: ClassificationMetrics::compute(&probs, &truth, self.decision),
                }
            })
            .collect();

        tracing::info!(
            folds = folds.count(),
            auc = stacked.roc_auc,
            f1 = stacked.f1,
            "out-of-fold stacked ensemble"
        );

        Ok(CrossValidatedStack {
            summary: CvSummary {
                folds: folds.count(),
                rows: rows.len(),
                learners: learner_metrics,
                stacked,
                per_fold,
            },
            trainer: self,
            rows,
            labels,
            folds,
            base_oof,
            meta_rows,
            stacked_oof,
        })
    }
}

/// Row-major meta-feature matrix: one column per base learner.
fn meta_features(columns: &[Vec<f64>], n: usize) -> Vec<Vec<f64>> {
    (0..n).map(|i| columns.iter().map(|c| c[i]).collect()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OofRow {
    pub row: usize,
    pub fold: usize,
    pub label: Label,
    /// One probability per base learner, in learner order.
    pub base: Vec<f64>,
    pub stacked: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OofPredictions {
    pub learners: Vec<BaseLearnerKind>,
    pub rows: Vec<OofRow>,
}

pub struct CrossValidatedStack<'a> {
    pub summary: CvSummary,
    trainer: StackingTrainer,
    rows: &'a [Vec<f64>],
    labels: &'a [Label],
    folds: Folds,
    base_oof: Vec<Vec<f64>>,
    meta_rows: Vec<Vec<f64>>,
    stacked_oof: Vec<f64>,
}

impl CrossValidatedStack<'_> {
    pub fn learners(&self) -> &[BaseLearnerKind] {
        &self.trainer.learners
    }

    /// Out-of-fold probabilities of one base learner, in row order.
    pub fn base_oof(&self, learner: usize) -> &[f64] {
        &self.base_oof[learner]
    }

    pub fn stacked_oof(&self) -> &[f64] {
        &self.stacked_oof
    }

    pub fn labels(&self) -> &[Label] {
        self.labels
    }

    pub fn fold_of(&self, row: usize) -> usize {
        self.folds.fold_of(row)
    }

    /// Row-level out-of-fold table for export.
    pub fn predictions(&self) -> OofPredictions {
        let rows = (0..self.labels.len())
            .map(|i| OofRow {
                row: i,
                fold: self.folds.fold_of(i),
                label: self.labels[i],
                base: self.base_oof.iter().map(|c| c[i]).collect(),
                stacked: self.stacked_oof[i],
            })
            .collect();
        OofPredictions {
            learners: self.trainer.learners.clone(),
            rows,
        }
    }

    /// Refit every base learner on all rows and the meta-learner on the
    /// out-of-fold matrix. The result is what gets deployed.
    pub fn refit(self) -> Result<(EnsembleArtifact, CvSummary), AppError> {
        let params = &self.trainer.params;
        let rows = self.rows;
        let labels = self.labels;

        let learners: Vec<BaseLearner> = self
            .trainer
            .learners
            .par_iter()
            .map(|&kind| -> Result<BaseLearner, AppError> {
                let mut learner = BaseLearner::new(kind, params);
                learner.fit(rows, labels)?;
                Ok(learner)
            })
            .collect::<Result<_, AppError>>()?;

        let mut meta = LogisticRegression::new(params.meta);
        meta.fit(&self.meta_rows, labels)?;

        tracing::info!(
            learners = learners.len(),
            rows = rows.len(),
            "refitted stack on full training set"
        );
        let artifact = EnsembleArtifact {
            run_id: String::new(),
            input_width: rows.first().map_or(0, Vec::len),
            learners,
            meta,
        };
        Ok((artifact, self.summary))
    }
}

/// Production ensemble: base learners plus the meta-learner over their outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleArtifact {
    pub run_id: String,
    /// Width of the reduced vectors the base learners were fitted on.
    pub input_width: usize,
    pub learners: Vec<BaseLearner>,
    pub meta: LogisticRegression,
}

impl EnsembleArtifact {
    /// Inputs the meta-learner expects (one per base learner).
    pub fn meta_width(&self) -> usize {
        self.meta.coefficients.len().saturating_sub(1)
    }

    pub fn base_probabilities(&self, row: &[f64]) -> Vec<f64> {
        self.learners.iter().map(|l| l.predict_proba(row)).collect()
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        self.meta.predict_proba(&self.base_probabilities(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GbdtParams, LogisticParams, TreeParams};
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    /// Memorises training rows exactly; unseen rows get a score derived from
    /// the row bits, unrelated to any label.
    #[derive(Default)]
    struct LookupTable {
        seen: HashMap<Vec<u64>, Label>,
    }

    fn key(row: &[f64]) -> Vec<u64> {
        row.iter().map(|v| v.to_bits()).collect()
    }

    impl Classifier for LookupTable {
        fn fit(&mut self, rows: &[Vec<f64>], labels: &[Label]) -> Result<(), AppError> {
            self.seen = rows.iter().map(|r| key(r)).zip(labels.iter().copied()).collect();
            Ok(())
        }

        fn predict_proba(&self, row: &[f64]) -> f64 {
            match self.seen.get(&key(row)) {
                Some(&l) => f64::from(l),
                None => {
                    let h = key(row).iter().fold(0xcbf29ce484222325u64, |acc, b| {
                        (acc ^ b).wrapping_mul(0x100000001b3)
                    });
                    (h % 1000) as f64 / 1000.0
                }
            }
        }
    }

    fn dataset(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<Label>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for _ in 0..n {
            let a: f64 = rng.gen_range(-2.0..2.0);
            let b: f64 = rng.gen_range(-2.0..2.0);
            let c: f64 = rng.gen_range(-2.0..2.0);
            let noise: f64 = rng.gen_range(-0.5..0.5);
            rows.push(vec![a, b, c]);
            labels.push(u8::from(a + 0.5 * b * b - 0.5 + noise > 0.0));
        }
        (rows, labels)
    }

    fn quick_config(folds: usize) -> TrainConfig {
        let mut config = TrainConfig {
            folds,
            ..TrainConfig::default()
        };
        config.params = LearnerParams {
            logistic: LogisticParams::default(),
            tree: TreeParams::default(),
            gbdt: GbdtParams {
                rounds: 20,
                ..GbdtParams::default()
            },
            meta: LogisticParams::default(),
        };
        config
    }

    #[test]
    fn out_of_fold_removes_memorised_signal() {
        // Labels carry no signal at all; only memorisation can fit them.
        let mut rng = StdRng::seed_from_u64(11);
        let rows: Vec<Vec<f64>> = (0..400)
            .map(|_| vec![rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)])
            .collect();
        let labels: Vec<Label> = (0..400).map(|_| rng.gen_range(0..2u8)).collect();
        let folds = Folds::stratified(&labels, 10, 42).unwrap();

        let mut in_sample = LookupTable::default();
        in_sample.fit(&rows, &labels).unwrap();
        let in_sample_metrics = ClassificationMetrics::compute(&in_sample.predict_all(&rows), &labels, 0.5);

        let oof = out_of_fold_probabilities(&rows, &labels, &folds, LookupTable::default).unwrap();
        let oof_metrics = ClassificationMetrics::compute(&oof, &labels, 0.5);

        assert_eq!(in_sample_metrics.accuracy, 1.0);
        assert_eq!(in_sample_metrics.roc_auc, 1.0);
        assert!(oof_metrics.roc_auc < 0.65, "oof auc {}", oof_metrics.roc_auc);
        assert!(oof_metrics.accuracy < 0.65, "oof accuracy {}", oof_metrics.accuracy);
    }

    #[test]
    fn out_of_fold_is_deterministic() {
        let (rows, labels) = dataset(200, 3);
        let folds = Folds::stratified(&labels, 5, 1).unwrap();
        let make = || BaseLearner::new(BaseLearnerKind::Tree, &LearnerParams::default());
        let a = out_of_fold_probabilities(&rows, &labels, &folds, make).unwrap();
        let b = out_of_fold_probabilities(&rows, &labels, &folds, make).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cross_validate_then_refit() {
        let (rows, labels) = dataset(300, 5);
        let stack = StackingTrainer::new(&quick_config(5))
            .cross_validate(&rows, &labels)
            .unwrap();

        assert_eq!(stack.summary.learners.len(), 3);
        assert_eq!(stack.summary.per_fold.len(), 5);
        assert_eq!(stack.summary.per_fold.iter().map(|f| f.rows).sum::<usize>(), 300);
        assert!(stack.summary.stacked.roc_auc > 0.8, "stacked auc {}", stack.summary.stacked.roc_auc);
        assert!(stack.stacked_oof().iter().all(|p| (0.0..=1.0).contains(p)));

        let table = stack.predictions();
        assert_eq!(table.rows.len(), 300);
        assert!(table.rows.iter().all(|r| r.base.len() == 3 && r.fold < 5));
        assert_eq!(table.rows[17].stacked, stack.stacked_oof()[17]);

        let (ensemble, summary) = stack.refit().unwrap();
        assert_eq!(summary.rows, 300);
        assert_eq!(ensemble.input_width, 3);
        assert_eq!(ensemble.meta_width(), 3);
        let kinds: Vec<BaseLearnerKind> = ensemble.learners.iter().map(BaseLearner::kind).collect();
        assert_eq!(kinds, BaseLearnerKind::DEFAULT_SET.to_vec());

        for r in rows.iter().take(20) {
            let p = ensemble.predict_proba(r);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn too_few_positives_for_folds_is_insufficient() {
        let (rows, mut labels) = dataset(100, 9);
        labels.iter_mut().for_each(|l| *l = 0);
        labels[0] = 1;
        let err = StackingTrainer::new(&quick_config(10))
            .cross_validate(&rows, &labels)
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 3);
    }
}
