//! Crate-wide error type.
//!
//! Every variant maps to a stable process exit code so `main` can stay a
//! one-liner. Validation failures are the only recoverable kind: they carry the
//! full violation list back to whoever submitted the record.

use thiserror::Error;

use crate::schema::ValidationReport;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// A record failed schema validation.
    #[error("{0}")]
    Validation(ValidationReport),

    /// Bad flags, schema table, or thresholds.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Io(String),

    /// Training data cannot support the configured folds, neighbours, or components.
    #[error("insufficient data: {0}")]
    DataSufficiency(String),

    /// A numeric field has zero variance over the training set.
    #[error("numeric field `{field}` has zero variance in the training set")]
    DegenerateFeature { field: String },

    /// A solver failed to produce finite parameters.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Bundle sub-artifacts do not come from the same training run.
    #[error("artifact version mismatch: {0}")]
    ArtifactVersion(String),
}

impl AppError {
    pub fn io(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        AppError::Io(format!("{context}: {err}"))
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Validation(_) | AppError::InvalidConfig(_) | AppError::Io(_) => 2,
            AppError::DataSufficiency(_) | AppError::DegenerateFeature { .. } => 3,
            AppError::Numerical(_) => 4,
            AppError::ArtifactVersion(_) => 5,
        }
    }

    /// True for errors the caller can fix by resubmitting corrected input.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_input_data_and_artifact_failures() {
        assert_eq!(AppError::InvalidConfig("x".into()).exit_code(), 2);
        assert_eq!(AppError::DataSufficiency("x".into()).exit_code(), 3);
        assert_eq!(
            AppError::DegenerateFeature { field: "Age".into() }.exit_code(),
            3
        );
        assert_eq!(AppError::ArtifactVersion("x".into()).exit_code(), 5);
        assert!(!AppError::ArtifactVersion("x".into()).is_recoverable());
    }
}
