//! The field table every record is checked against.
//!
//! `Schema::canonical()` is the single authoritative table. A replacement can
//! be loaded from JSON, but it goes through the same construction checks and
//! is stored in the artifact bundle so serving validates against exactly what
//! training saw.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FieldKind, FieldSpec};
use crate::error::AppError;

/// Name of the ground-truth column in training data.
pub const LABEL_FIELD: &str = "Attrition";
/// Employee identifier. Not a feature; training rows must not repeat it.
pub const ID_FIELD: &str = "EmployeeNumber";

/// Ordered, checked set of field contracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Build a schema, rejecting tables the pipeline cannot honour.
    ///
    /// Requirements: at least one field, unique names, `min <= max` on numeric
    /// fields, and a non-empty, duplicate-free category set on categorical ones.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, AppError> {
        let schema = Self { fields };
        schema.check()?;
        Ok(schema)
    }

    /// Re-run construction checks (used after deserializing).
    pub fn check(&self) -> Result<(), AppError> {
        if self.fields.is_empty() {
            return Err(AppError::InvalidConfig("schema has no fields".into()));
        }
        let mut seen = HashSet::new();
        for spec in &self.fields {
            if spec.name.trim().is_empty() {
                return Err(AppError::InvalidConfig("schema field with empty name".into()));
            }
            if spec.name == LABEL_FIELD {
                return Err(AppError::InvalidConfig(format!(
                    "`{LABEL_FIELD}` is the label column and cannot be a feature"
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(AppError::InvalidConfig(format!(
                    "schema field `{}` declared twice",
                    spec.name
                )));
            }
            match &spec.kind {
                FieldKind::BoundedInt { min, max } if min > max => {
                    return Err(AppError::InvalidConfig(format!(
                        "field `{}`: min {min} exceeds max {max}",
                        spec.name
                    )));
                }
                FieldKind::BoundedFloat { min, max } if !(min.is_finite() && max.is_finite() && min <= max) => {
                    return Err(AppError::InvalidConfig(format!(
                        "field `{}`: invalid bounds [{min}, {max}]",
                        spec.name
                    )));
                }
                FieldKind::Category { allowed } => {
                    if allowed.is_empty() {
                        return Err(AppError::InvalidConfig(format!(
                            "field `{}` has an empty category set",
                            spec.name
                        )));
                    }
                    let unique: HashSet<&String> = allowed.iter().collect();
                    if unique.len() != allowed.len() {
                        return Err(AppError::InvalidConfig(format!(
                            "field `{}` lists a category twice",
                            spec.name
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Load a schema table from a JSON file (`{"fields": [...]}`).
    pub fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("failed to open schema '{}'", path.display()), e))?;
        let schema: Schema = serde_json::from_reader(file)
            .map_err(|e| AppError::InvalidConfig(format!("invalid schema JSON: {e}")))?;
        schema.check()?;
        Ok(schema)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Numeric fields in declared order.
    pub fn numeric_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.kind.is_numeric())
    }

    /// Categorical fields in declared order.
    pub fn categorical_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.kind.is_numeric())
    }

    pub fn numeric_count(&self) -> usize {
        self.numeric_fields().count()
    }

    pub fn categorical_count(&self) -> usize {
        self.categorical_fields().count()
    }

    /// The canonical HR attrition field table.
    pub fn canonical() -> Self {
        let fields = vec![
            FieldSpec::int("Age", 18, 70),
            FieldSpec::int("DailyRate", 0, 3000),
            FieldSpec::int("DistanceFromHome", 0, 30),
            FieldSpec::int("Education", 1, 5),
            FieldSpec::int("EnvironmentSatisfaction", 1, 4),
            FieldSpec::int("HourlyRate", 0, 200),
            FieldSpec::int("JobInvolvement", 1, 4),
            FieldSpec::int("JobLevel", 1, 5),
            FieldSpec::int("JobSatisfaction", 1, 4),
            FieldSpec::float("MonthlyIncome", 0.0, 100_000.0),
            FieldSpec::int("MonthlyRate", 0, 30_000),
            FieldSpec::int("NumCompaniesWorked", 0, 20),
            FieldSpec::int("PercentSalaryHike", 0, 100),
            FieldSpec::int("PerformanceRating", 1, 4),
            FieldSpec::int("RelationshipSatisfaction", 1, 4),
            FieldSpec::int("StockOptionLevel", 0, 3),
            FieldSpec::int("TotalWorkingYears", 0, 60),
            FieldSpec::int("TrainingTimesLastYear", 0, 10),
            FieldSpec::int("WorkLifeBalance", 1, 4),
            FieldSpec::int("YearsAtCompany", 0, 60),
            FieldSpec::int("YearsSinceLastPromotion", 0, 40),
            FieldSpec::category(
                "BusinessTravel",
                &["Non-Travel", "Travel_Rarely", "Travel_Frequently"],
            ),
            FieldSpec::category(
                "Department",
                &["Sales", "Research & Development", "Human Resources"],
            ),
            FieldSpec::category(
                "EducationField",
                &[
                    "Life Sciences",
                    "Medical",
                    "Marketing",
                    "Technical Degree",
                    "Other",
                    "Human Resources",
                ],
            ),
            FieldSpec::category("Gender", &["Male", "Female"]),
            FieldSpec::category(
                "JobRole",
                &[
                    "Sales Executive",
                    "Research Scientist",
                    "Laboratory Technician",
                    "Manufacturing Director",
                    "Healthcare Representative",
                    "Manager",
                    "Sales Representative",
                    "Research Director",
                    "Human Resources",
                ],
            ),
            FieldSpec::category("MaritalStatus", &["Single", "Married", "Divorced"]),
            FieldSpec::category("OverTime", &["Yes", "No"]),
        ];
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_table_passes_its_own_checks() {
        let schema = Schema::canonical();
        schema.check().unwrap();
        assert_eq!(schema.numeric_count(), 21);
        assert_eq!(schema.categorical_count(), 7);
    }

    #[test]
    fn rejects_inverted_bounds_and_empty_categories() {
        let err = Schema::new(vec![FieldSpec::int("Age", 70, 18)]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(Schema::new(vec![FieldSpec::category("OverTime", &[])]).is_err());
        assert!(Schema::new(vec![FieldSpec::float("X", 1.0, f64::NAN)]).is_err());
    }

    #[test]
    fn rejects_duplicate_names_and_label_as_feature() {
        assert!(Schema::new(vec![FieldSpec::int("Age", 1, 2), FieldSpec::int("Age", 1, 2)]).is_err());
        assert!(Schema::new(vec![FieldSpec::category(LABEL_FIELD, &["Yes", "No"])]).is_err());
    }

    #[test]
    fn json_table_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, serde_json::to_string(&Schema::canonical()).unwrap()).unwrap();
        let loaded = Schema::from_json_file(&path).unwrap();
        assert_eq!(loaded, Schema::canonical());
    }

    #[test]
    fn missing_schema_file_is_an_io_error() {
        let err = Schema::from_json_file(Path::new("/definitely/not/schema.json")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("failed to open schema"), "{err}");
    }
}
