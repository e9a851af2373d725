//! Record validation against a `Schema`.
//!
//! All checks run for every field and violations accumulate, so a caller sees
//! every problem in one round trip. A record that passes is returned in typed
//! form (`ValidatedRecord`) so downstream code never re-parses raw values.

use std::fmt;

use serde::Serialize;

use crate::domain::{FieldKind, RawRecord, RawValue};
use crate::schema::Schema;

/// What went wrong with one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
    Missing,
    NotNumeric { value: String },
    NotInteger { value: f64 },
    OutOfRange { value: f64, min: f64, max: f64 },
    NotText { value: String },
    UnknownCategory { value: String, allowed: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub field: String,
    #[serde(flatten)]
    pub problem: Problem,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        match &self.problem {
            Problem::Missing => write!(f, "missing required field: {field}"),
            Problem::NotNumeric { value } => write!(f, "{field} must be a number (got {value})"),
            Problem::NotInteger { value } => write!(f, "{field} must be a whole number (got {value})"),
            Problem::OutOfRange { value, min, max } => {
                write!(f, "{field} must be within [{min}, {max}] (got {value})")
            }
            Problem::NotText { value } => write!(f, "{field} must be a string (got {value})"),
            Problem::UnknownCategory { value, allowed } => {
                write!(f, "{field} must be one of: {} (got {value:?})", allowed.join(", "))
            }
        }
    }
}

/// Non-empty list of field violations, in the schema's declared field order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Source line, when the record came from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {line}: ")?;
        }
        write!(f, "record failed validation ({} problem(s))", self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n  - {v}")?;
        }
        Ok(())
    }
}

/// A record that passed validation, in typed form.
///
/// `numeric` follows the schema's numeric field order, `categories` its
/// categorical field order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub numeric: Vec<f64>,
    pub categories: Vec<String>,
}

/// Check a raw record against every field contract.
pub fn validate(schema: &Schema, record: &RawRecord) -> Result<ValidatedRecord, ValidationReport> {
    let mut violations = Vec::new();
    let mut numeric = Vec::with_capacity(schema.numeric_count());
    let mut categories = Vec::with_capacity(schema.categorical_count());

    for spec in schema.fields() {
        let Some(raw) = record.get(&spec.name) else {
            violations.push(Violation {
                field: spec.name.clone(),
                problem: Problem::Missing,
            });
            continue;
        };

        let outcome = match &spec.kind {
            FieldKind::BoundedInt { min, max } => {
                check_number(raw, *min as f64, *max as f64, true).map(|v| numeric.push(v))
            }
            FieldKind::BoundedFloat { min, max } => {
                check_number(raw, *min, *max, false).map(|v| numeric.push(v))
            }
            FieldKind::Category { allowed } => {
                check_category(raw, allowed).map(|v| categories.push(v))
            }
        };

        if let Err(problem) = outcome {
            violations.push(Violation {
                field: spec.name.clone(),
                problem,
            });
        }
    }

    if violations.is_empty() {
        Ok(ValidatedRecord { numeric, categories })
    } else {
        Err(ValidationReport { line: None, violations })
    }
}

fn check_number(raw: &RawValue, min: f64, max: f64, integral: bool) -> Result<f64, Problem> {
    let value = raw.as_number().ok_or_else(|| Problem::NotNumeric {
        value: raw.to_string(),
    })?;
    if integral && value.fract() != 0.0 {
        return Err(Problem::NotInteger { value });
    }
    if value < min || value > max {
        return Err(Problem::OutOfRange { value, min, max });
    }
    Ok(value)
}

fn check_category(raw: &RawValue, allowed: &[String]) -> Result<String, Problem> {
    let Some(text) = raw.as_text() else {
        return Err(Problem::NotText {
            value: raw.to_string(),
        });
    };
    let text = text.trim();
    if allowed.iter().any(|a| a == text) {
        Ok(text.to_string())
    } else {
        Err(Problem::UnknownCategory {
            value: text.to_string(),
            allowed: allowed.to_vec(),
        })
    }
}
