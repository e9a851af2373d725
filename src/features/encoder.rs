//! Numeric standardization and categorical one-hot encoding.
//!
//! Column layout of every encoded vector:
//!
//! ```text
//! [numeric fields in declared order]
//! [one-hot block per categorical field, in declared order]
//!     each block = fitted vocabulary (lexicographic) + one trailing `unknown` slot
//! ```
//!
//! The layout is fixed by `FeatureArtifact` and never depends on the record
//! being encoded.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::mean_std;
use crate::schema::{Schema, ValidatedRecord};

/// Fixed-length model input produced by the encoder.
pub type EncodedVector = Vec<f64>;

/// Standard deviations at or below this are treated as zero variance.
const MIN_STD: f64 = 1e-12;

/// Label used for the reserved out-of-vocabulary column in column names.
pub const UNKNOWN_SLOT: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaling {
    pub field: String,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub field: String,
    /// Observed values in lexicographic order. The unknown slot follows them.
    pub vocabulary: Vec<String>,
}

impl CategoryVocabulary {
    /// Block width including the unknown slot.
    pub fn width(&self) -> usize {
        self.vocabulary.len() + 1
    }

    fn slot(&self, value: &str) -> usize {
        self.vocabulary
            .binary_search_by(|v| v.as_str().cmp(value))
            .unwrap_or(self.vocabulary.len())
    }
}

/// Fitted encoder state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureArtifact {
    /// Training run this artifact belongs to.
    pub run_id: String,
    pub numeric: Vec<NumericScaling>,
    pub categorical: Vec<CategoryVocabulary>,
}

impl FeatureArtifact {
    /// Length of every encoded vector.
    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.width()).sum::<usize>()
    }

    /// Human-readable column names, in encoded order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|n| n.field.clone()).collect();
        for block in &self.categorical {
            for value in &block.vocabulary {
                names.push(format!("{}={}", block.field, value));
            }
            names.push(format!("{}={}", block.field, UNKNOWN_SLOT));
        }
        names
    }

    /// Encode one validated record.
    pub fn transform(&self, record: &ValidatedRecord) -> Result<EncodedVector, AppError> {
        if record.numeric.len() != self.numeric.len()
            || record.categories.len() != self.categorical.len()
        {
            return Err(AppError::ArtifactVersion(format!(
                "record has {} numeric / {} categorical fields, encoder expects {} / {}",
                record.numeric.len(),
                record.categories.len(),
                self.numeric.len(),
                self.categorical.len()
            )));
        }

        let mut out = Vec::with_capacity(self.width());
        for (scaling, &value) in self.numeric.iter().zip(record.numeric.iter()) {
            out.push((value - scaling.mean) / scaling.std);
        }
        for (block, value) in self.categorical.iter().zip(record.categories.iter()) {
            let start = out.len();
            out.resize(start + block.width(), 0.0);
            out[start + block.slot(value)] = 1.0;
        }
        Ok(out)
    }

    pub fn transform_all(&self, records: &[ValidatedRecord]) -> Result<Vec<EncodedVector>, AppError> {
        records.iter().map(|r| self.transform(r)).collect()
    }

    /// Check that this artifact was fitted against `schema`'s field layout.
    pub fn check_schema(&self, schema: &Schema) -> Result<(), AppError> {
        let numeric: Vec<&str> = schema.numeric_fields().map(|f| f.name.as_str()).collect();
        let categorical: Vec<&str> = schema.categorical_fields().map(|f| f.name.as_str()).collect();
        let fitted_numeric: Vec<&str> = self.numeric.iter().map(|n| n.field.as_str()).collect();
        let fitted_categorical: Vec<&str> = self.categorical.iter().map(|c| c.field.as_str()).collect();

        if numeric != fitted_numeric || categorical != fitted_categorical {
            return Err(AppError::ArtifactVersion(
                "feature artifact field layout does not match the bundled schema".into(),
            ));
        }
        Ok(())
    }
}

/// Fits a `FeatureArtifact` from training records.
pub struct FeatureEncoder;

impl FeatureEncoder {
    pub fn fit(schema: &Schema, records: &[ValidatedRecord]) -> Result<FeatureArtifact, AppError> {
        if records.is_empty() {
            return Err(AppError::DataSufficiency(
                "cannot fit the feature encoder on zero records".into(),
            ));
        }

        let mut numeric = Vec::with_capacity(schema.numeric_count());
        for (col, spec) in schema.numeric_fields().enumerate() {
            let values: Vec<f64> = records.iter().map(|r| r.numeric[col]).collect();
            let (mean, std) = mean_std(&values).ok_or_else(|| {
                AppError::DataSufficiency(format!("no values for field `{}`", spec.name))
            })?;
            if !(std.is_finite() && std > MIN_STD) {
                return Err(AppError::DegenerateFeature {
                    field: spec.name.clone(),
                });
            }
            numeric.push(NumericScaling {
                field: spec.name.clone(),
                mean,
                std,
            });
        }

        let categorical = schema
            .categorical_fields()
            .enumerate()
            .map(|(col, spec)| {
                let observed: BTreeSet<&str> =
                    records.iter().map(|r| r.categories[col].as_str()).collect();
                CategoryVocabulary {
                    field: spec.name.clone(),
                    vocabulary: observed.into_iter().map(str::to_string).collect(),
                }
            })
            .collect();

        let artifact = FeatureArtifact {
            run_id: String::new(),
            numeric,
            categorical,
        };
        tracing::debug!(
            width = artifact.width(),
            numeric = artifact.numeric.len(),
            categorical = artifact.categorical.len(),
            "fitted feature encoder"
        );
        Ok(artifact)
    }
}
