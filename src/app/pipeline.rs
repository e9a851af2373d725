//! The training pipeline shared by `train` and the tests.
//!
//! validate -> encode -> resample -> reduce -> cross-validate -> refit -> bundle
//!
//! Each step consumes the previous step's output, so they run in sequence; the
//! parallelism lives inside the steps (neighbour search, folds, refits).

use chrono::Utc;

use crate::data::SyntheticRow;
use crate::domain::{Label, TrainConfig};
use crate::error::AppError;
use crate::features::FeatureEncoder;
use crate::fit::{OofPredictions, StackingTrainer};
use crate::io::{ArtifactBundle, BUNDLE_FORMAT_VERSION, DatasetStats, LabeledDataset, RowError, TrainingStats};
use crate::reduce::DimensionalityReducer;
use crate::resample::{SmoteParams, oversample_minority};
use crate::schema::Schema;

/// All outputs of a single `train` run.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    /// Unsealed; `io::write_bundle` seals it.
    pub bundle: ArtifactBundle,
    pub oof: OofPredictions,
}

/// Validate generated rows into a training set.
pub fn dataset_from_rows(schema: &Schema, rows: &[SyntheticRow]) -> Result<LabeledDataset, AppError> {
    let mut records = Vec::with_capacity(rows.len());
    let mut labels: Vec<Label> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let record = schema
            .validate(&row.record)
            .map_err(|report| AppError::Validation(report.at_line(i + 1)))?;
        records.push(record);
        labels.push(row.label);
    }
    Ok(LabeledDataset {
        stats: DatasetStats::from_labels(&labels),
        records,
        labels,
        row_errors: Vec::<RowError>::new(),
        rows_read: rows.len(),
    })
}

/// Execute the full training pipeline.
pub fn run_training(schema: &Schema, data: &LabeledDataset, config: &TrainConfig) -> Result<TrainingRun, AppError> {
    config.validate()?;

    // 1) Fit the encoder on the labeled rows and encode them.
    let mut features = FeatureEncoder::fit(schema, &data.records)?;
    let encoded = features.transform_all(&data.records)?;

    // 2) Balance the classes in encoded space.
    let resampled = oversample_minority(
        &encoded,
        &data.labels,
        SmoteParams {
            neighbours: config.neighbours,
            seed: config.seed,
        },
    )?;

    // 3) Principal components of the balanced matrix.
    let mut reducer = DimensionalityReducer::fit(&resampled.rows, config.components)?;
    let reduced = reducer.transform_all(&resampled.rows)?;

    // 4) Out-of-fold stacking, then the production refit.
    let stack = StackingTrainer::new(config).cross_validate(&reduced, &resampled.labels)?;
    let oof = stack.predictions();
    let (mut ensemble, cv) = stack.refit()?;

    // 5) Stamp every artifact with one run id and assemble the bundle.
    let created_at = Utc::now();
    let run_id = derive_run_id(config.seed, &created_at.to_rfc3339(), &resampled.labels, &reduced);
    features.run_id = run_id.clone();
    reducer.run_id = run_id.clone();
    ensemble.run_id = run_id.clone();

    let training = TrainingStats {
        rows: data.stats.rows,
        attrition: data.stats.attrition,
        retained: data.stats.retained,
        skipped_rows: data.row_errors.len(),
        synthetic_rows: resampled.synthetic.len(),
        encoded_width: features.width(),
        components: reducer.output_width(),
        retained_variance: reducer.retained_variance(),
        seed: config.seed,
    };
    tracing::info!(run_id = %run_id, "training run complete");

    Ok(TrainingRun {
        bundle: ArtifactBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            run_id,
            created_at,
            schema: schema.clone(),
            features,
            reducer,
            ensemble,
            thresholds: config.thresholds,
            training,
            cv,
            checksum: String::new(),
        },
        oof,
    })
}

fn derive_run_id(seed: u64, created_at: &str, labels: &[Label], rows: &[Vec<f64>]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(created_at.as_bytes());
    hasher.update(labels);
    for row in rows {
        for v in row {
            hasher.update(&v.to_le_bytes());
        }
    }
    hex::encode(&hasher.finalize().as_bytes()[..8])
}
