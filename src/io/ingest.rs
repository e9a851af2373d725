//! CSV and JSON ingest.
//!
//! Training CSVs carry one employee per row plus the `Attrition` label. Every
//! cell is read as text; typing and bounds are left to the schema validator.
//! By default the first invalid row aborts the load. With `skip_invalid` the
//! bad rows are collected as `RowError`s and the rest are kept. A repeated
//! `EmployeeNumber` counts as an invalid row; the first occurrence is kept.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{ATTRITION, Label, RETAINED, RawRecord, RawValue};
use crate::error::AppError;
use crate::schema::{ID_FIELD, LABEL_FIELD, Schema, ValidatedRecord};

/// Class balance of the rows actually kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub rows: usize,
    pub attrition: usize,
    pub retained: usize,
}

impl DatasetStats {
    pub fn from_labels(labels: &[Label]) -> Self {
        let attrition = labels.iter().filter(|&&l| l == ATTRITION).count();
        Self {
            rows: labels.len(),
            attrition,
            retained: labels.len() - attrition,
        }
    }

    pub fn attrition_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.attrition as f64 / self.rows as f64
        }
    }
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Validated training rows, labels, and what was dropped on the way.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub records: Vec<ValidatedRecord>,
    pub labels: Vec<Label>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// One raw CSV row with its 1-based line number.
#[derive(Debug, Clone)]
pub struct CsvRow {
    pub line: usize,
    pub record: RawRecord,
}

/// Accepts `Yes`/`No` (any case) and `1`/`0`.
pub fn parse_label(text: &str) -> Option<Label> {
    let t = text.trim();
    if t.eq_ignore_ascii_case("yes") || t == "1" {
        Some(ATTRITION)
    } else if t.eq_ignore_ascii_case("no") || t == "0" {
        Some(RETAINED)
    } else {
        None
    }
}

/// Read every row of a CSV into raw records. Parse failures are returned as
/// row errors rather than aborting.
pub fn read_csv_rows(path: &Path) -> Result<(Vec<CsvRow>, Vec<RowError>), AppError> {
    let file = File::open(path).map_err(|e| AppError::io(format!("failed to open CSV '{}'", path.display()), e))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::io("failed to read CSV headers", e))?
        .clone();
    let header_map = build_header_map(&headers);

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; lines are 1-based.
        let line = idx + 2;
        match result {
            Ok(record) => rows.push(CsvRow {
                line,
                record: to_raw_record(&record, &header_map),
            }),
            Err(e) => errors.push(RowError {
                line,
                message: format!("CSV parse error: {e}"),
            }),
        }
    }
    Ok((rows, errors))
}

/// Load a labeled training CSV and validate every row against `schema`.
pub fn load_training_csv(path: &Path, schema: &Schema, skip_invalid: bool) -> Result<LabeledDataset, AppError> {
    let (rows, parse_errors) = read_csv_rows(path)?;
    let rows_read = rows.len() + parse_errors.len();

    if let (false, Some(first)) = (skip_invalid, parse_errors.first()) {
        return Err(AppError::InvalidConfig(format!("line {}: {}", first.line, first.message)));
    }

    let mut records = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());
    let mut row_errors = parse_errors;
    // Employee id -> line of the row that was kept with it.
    let mut seen_ids: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let label = row.record.get(LABEL_FIELD).and_then(|v| v.as_text()).and_then(parse_label);
        let validated = schema.validate(&row.record);
        let id = row.record.get(ID_FIELD).map(|v| v.to_cell().trim().to_string());
        let repeat = id.as_ref().and_then(|id| seen_ids.get(id).copied());

        match (label, validated, repeat) {
            (Some(label), Ok(record), None) => {
                if let Some(id) = id {
                    seen_ids.insert(id, row.line);
                }
                records.push(record);
                labels.push(label);
            }
            (label, validated, repeat) => {
                let mut problems = Vec::new();
                if label.is_none() {
                    problems.push(format!("{LABEL_FIELD} must be Yes/No or 1/0"));
                }
                if let (Some(first), Some(id)) = (repeat, &id) {
                    problems.push(format!("{ID_FIELD} {id} already used on line {first}"));
                }
                if let Err(report) = validated {
                    if !skip_invalid {
                        return Err(AppError::Validation(report.at_line(row.line)));
                    }
                    problems.extend(report.violations.iter().map(ToString::to_string));
                }
                if !skip_invalid {
                    return Err(AppError::InvalidConfig(format!("line {}: {}", row.line, problems.join("; "))));
                }
                row_errors.push(RowError {
                    line: row.line,
                    message: problems.join("; "),
                });
            }
        }
    }

    if records.is_empty() {
        return Err(AppError::DataSufficiency(format!(
            "no usable rows in '{}' ({rows_read} read)",
            path.display()
        )));
    }
    if !row_errors.is_empty() {
        tracing::warn!(skipped = row_errors.len(), "skipped invalid training rows");
    }

    let stats = DatasetStats::from_labels(&labels);
    tracing::info!(
        rows = stats.rows,
        attrition = stats.attrition,
        retained = stats.retained,
        "loaded training data"
    );
    Ok(LabeledDataset {
        records,
        labels,
        stats,
        row_errors,
        rows_read,
    })
}

/// Read one JSON object as a raw record.
pub fn read_record_json(path: &Path) -> Result<RawRecord, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(format!("failed to open '{}'", path.display()), e))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::InvalidConfig(format!("'{}' is not a JSON object of fields: {e}", path.display())))
}

fn to_raw_record(record: &StringRecord, header_map: &HashMap<String, usize>) -> RawRecord {
    header_map
        .iter()
        .filter_map(|(name, &idx)| {
            let cell = record.get(idx)?;
            // Empty cells are treated as absent so validation reports them as missing.
            (!cell.is_empty()).then(|| (name.clone(), RawValue::Text(cell.to_string())))
        })
        .collect()
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{SyntheticConfig, generate_rows};
    use crate::io::export::write_dataset_csv;
    use std::io::Write;

    fn header_line(schema: &Schema) -> String {
        let mut names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        names.push(LABEL_FIELD);
        names.join(",")
    }

    #[test]
    fn labels_parse_both_spellings() {
        assert_eq!(parse_label("Yes"), Some(1));
        assert_eq!(parse_label(" no "), Some(0));
        assert_eq!(parse_label("1"), Some(1));
        assert_eq!(parse_label("0"), Some(0));
        assert_eq!(parse_label("maybe"), None);
    }

    #[test]
    fn loads_generated_dataset() {
        let schema = Schema::canonical();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let rows = generate_rows(&SyntheticConfig { rows: 120, seed: 4 }).unwrap();
        write_dataset_csv(&path, &schema, &rows).unwrap();

        let data = load_training_csv(&path, &schema, false).unwrap();
        assert_eq!(data.records.len(), 120);
        assert_eq!(data.rows_read, 120);
        assert!(data.row_errors.is_empty());
        assert_eq!(data.stats.attrition + data.stats.retained, 120);
    }

    #[test]
    fn strict_mode_rejects_first_invalid_row_with_its_line() {
        let schema = Schema::canonical();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let rows = generate_rows(&SyntheticConfig { rows: 20, seed: 4 }).unwrap();
        write_dataset_csv(&path, &schema, &rows).unwrap();

        // Append a row whose Age is out of range.
        let mut bad = rows[0].clone();
        bad.record.insert("Age".into(), RawValue::Int(99));
        let line: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| bad.record[&f.name].to_cell())
            .chain(std::iter::once("No".to_string()))
            .collect();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", line.join(",")).unwrap();

        let err = load_training_csv(&path, &schema, false).unwrap_err();
        match err {
            AppError::Validation(report) => {
                assert_eq!(report.line, Some(22));
                assert!(report.mentions("Age"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }

        let lenient = load_training_csv(&path, &schema, true).unwrap();
        assert_eq!(lenient.records.len(), 20);
        assert_eq!(lenient.row_errors.len(), 1);
        assert_eq!(lenient.row_errors[0].line, 22);
    }

    #[test]
    fn bom_and_missing_label_are_handled() {
        let schema = Schema::canonical();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.csv");
        let rows = generate_rows(&SyntheticConfig { rows: 2, seed: 1 }).unwrap();

        let mut text = format!("\u{feff}{}\n", header_line(&schema));
        for (i, row) in rows.iter().enumerate() {
            let mut cells: Vec<String> = schema.fields().iter().map(|f| row.record[&f.name].to_cell()).collect();
            cells.push(if i == 0 { "Yes".into() } else { String::new() });
            text.push_str(&cells.join(","));
            text.push('\n');
        }
        std::fs::write(&path, text).unwrap();

        let data = load_training_csv(&path, &schema, true).unwrap();
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.labels, vec![1]);
        assert!(data.row_errors[0].message.contains("Attrition"));
    }

    #[test]
    fn repeated_employee_numbers_are_rejected() {
        let schema = Schema::canonical();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.csv");
        let rows = generate_rows(&SyntheticConfig { rows: 6, seed: 3 }).unwrap();

        let mut text = format!("{ID_FIELD},{}\n", header_line(&schema));
        for (i, id) in [101, 102, 103, 104, 105, 103].iter().enumerate() {
            let mut cells = vec![id.to_string()];
            cells.extend(schema.fields().iter().map(|f| rows[i].record[&f.name].to_cell()));
            cells.push("No".into());
            text.push_str(&cells.join(","));
            text.push('\n');
        }
        std::fs::write(&path, text).unwrap();

        let err = load_training_csv(&path, &schema, false).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let message = err.to_string();
        assert!(message.contains("line 7") && message.contains("line 4"), "{message}");

        let lenient = load_training_csv(&path, &schema, true).unwrap();
        assert_eq!(lenient.records.len(), 5);
        assert_eq!(lenient.row_errors.len(), 1);
        assert_eq!(lenient.row_errors[0].line, 7);
        assert!(lenient.row_errors[0].message.contains(ID_FIELD));
    }

    #[test]
    fn empty_file_is_insufficient() {
        let schema = Schema::canonical();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, format!("{}\n", header_line(&schema))).unwrap();
        let err = load_training_csv(&path, &schema, true).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
