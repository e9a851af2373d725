//! Immutable serving state.
//!
//! A `ServingContext` can only be built from a complete, mutually consistent
//! set of artifacts. Construction fails on any mismatch, so a process that
//! holds a context can score without further checks.

use crate::domain::ConfidenceThresholds;
use crate::error::AppError;
use crate::features::FeatureArtifact;
use crate::fit::EnsembleArtifact;
use crate::io::ArtifactBundle;
use crate::reduce::ReducerArtifact;
use crate::schema::Schema;

#[derive(Debug, Clone)]
pub struct ServingContext {
    run_id: String,
    schema: Schema,
    features: FeatureArtifact,
    reducer: ReducerArtifact,
    ensemble: EnsembleArtifact,
    thresholds: ConfidenceThresholds,
}

impl ServingContext {
    pub fn new(
        run_id: String,
        schema: Schema,
        features: FeatureArtifact,
        reducer: ReducerArtifact,
        ensemble: EnsembleArtifact,
        thresholds: ConfidenceThresholds,
    ) -> Result<Self, AppError> {
        schema.check()?;
        thresholds.validate()?;
        check_artifact_chain(&run_id, &schema, &features, &reducer, &ensemble)?;
        Ok(Self {
            run_id,
            schema,
            features,
            reducer,
            ensemble,
            thresholds,
        })
    }

    /// Build from a bundle already verified by `io::read_bundle`.
    pub fn from_bundle(bundle: ArtifactBundle) -> Result<Self, AppError> {
        let ctx = Self::new(
            bundle.run_id,
            bundle.schema,
            bundle.features,
            bundle.reducer,
            bundle.ensemble,
            bundle.thresholds,
        )?;
        tracing::info!(
            run_id = %ctx.run_id,
            encoded_width = ctx.features.width(),
            components = ctx.reducer.output_width(),
            learners = ctx.ensemble.learners.len(),
            "serving context ready"
        );
        Ok(ctx)
    }

    /// Replace the bundled thresholds.
    pub fn with_thresholds(mut self, thresholds: ConfidenceThresholds) -> Result<Self, AppError> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(self)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn features(&self) -> &FeatureArtifact {
        &self.features
    }

    pub fn reducer(&self) -> &ReducerArtifact {
        &self.reducer
    }

    pub fn ensemble(&self) -> &EnsembleArtifact {
        &self.ensemble
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        &self.thresholds
    }
}

/// Every sub-artifact must come from `run_id` and the vector widths must chain:
/// encoder -> reducer -> base learners -> meta-learner.
pub fn check_artifact_chain(
    run_id: &str,
    schema: &Schema,
    features: &FeatureArtifact,
    reducer: &ReducerArtifact,
    ensemble: &EnsembleArtifact,
) -> Result<(), AppError> {
    for (name, id) in [
        ("feature", features.run_id.as_str()),
        ("reducer", reducer.run_id.as_str()),
        ("ensemble", ensemble.run_id.as_str()),
    ] {
        if id != run_id {
            return Err(AppError::ArtifactVersion(format!(
                "{name} artifact belongs to run `{id}`, bundle is run `{run_id}`"
            )));
        }
    }

    features.check_schema(schema)?;

    if features.width() != reducer.input_width {
        return Err(AppError::ArtifactVersion(format!(
            "encoder produces {} columns, reducer expects {}",
            features.width(),
            reducer.input_width
        )));
    }
    if reducer.mean.len() != reducer.input_width
        || reducer.components.iter().any(|c| c.len() != reducer.input_width)
    {
        return Err(AppError::ArtifactVersion("reducer components are malformed".into()));
    }
    if reducer.output_width() != ensemble.input_width {
        return Err(AppError::ArtifactVersion(format!(
            "reducer produces {} components, ensemble expects {} inputs",
            reducer.output_width(),
            ensemble.input_width
        )));
    }
    if let Some((i, learner)) = ensemble
        .learners
        .iter()
        .enumerate()
        .find(|(_, l)| !l.accepts_width(ensemble.input_width))
    {
        return Err(AppError::ArtifactVersion(format!(
            "base learner {i} ({}) was not fitted on {}-wide inputs",
            learner.kind().display_name(),
            ensemble.input_width
        )));
    }
    if ensemble.learners.is_empty() || ensemble.learners.len() != ensemble.meta_width() {
        return Err(AppError::ArtifactVersion(format!(
            "ensemble has {} base learner(s) but its meta-learner takes {} input(s)",
            ensemble.learners.len(),
            ensemble.meta_width()
        )));
    }
    Ok(())
}
