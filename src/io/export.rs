//! File exports: datasets, out-of-fold predictions, metrics, batch scores.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::data::SyntheticRow;
use crate::error::AppError;
use crate::fit::{CvSummary, OofPredictions};
use crate::schema::{LABEL_FIELD, Schema};
use crate::serve::BatchOutcome;

/// Write rows in training-CSV layout (schema fields, then `Attrition`).
pub fn write_dataset_csv(path: &Path, schema: &Schema, rows: &[SyntheticRow]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("failed to create dataset CSV '{}'", path.display()), e))?;

    let mut header: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
    header.push(LABEL_FIELD);
    writer
        .write_record(&header)
        .map_err(|e| AppError::io("failed to write dataset CSV header", e))?;

    for row in rows {
        let mut cells: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| row.record.get(&f.name).map(|v| v.to_cell()).unwrap_or_default())
            .collect();
        cells.push(if row.label == 1 { "Yes" } else { "No" }.to_string());
        writer
            .write_record(&cells)
            .map_err(|e| AppError::io("failed to write dataset CSV row", e))?;
    }
    writer.flush().map_err(|e| AppError::io("failed to flush dataset CSV", e))?;
    Ok(())
}

/// One line per training row: fold, label, each base learner, stacked.
pub fn write_oof_csv(path: &Path, oof: &OofPredictions) -> Result<(), AppError> {
    let mut file = BufWriter::new(
        File::create(path).map_err(|e| AppError::io(format!("failed to create OOF CSV '{}'", path.display()), e))?,
    );

    let learner_cols: Vec<String> = oof.learners.iter().map(|k| format!("p_{}", k.display_name())).collect();
    writeln!(file, "row,fold,label,{},p_stacked", learner_cols.join(","))
        .map_err(|e| AppError::io("failed to write OOF CSV header", e))?;

    for r in &oof.rows {
        let base: Vec<String> = r.base.iter().map(|p| format!("{p:.6}")).collect();
        writeln!(file, "{},{},{},{},{:.6}", r.row, r.fold, r.label, base.join(","), r.stacked)
            .map_err(|e| AppError::io("failed to write OOF CSV row", e))?;
    }
    file.flush().map_err(|e| AppError::io("failed to flush OOF CSV", e))?;
    Ok(())
}

pub fn write_metrics_json(path: &Path, cv: &CvSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create metrics JSON '{}'", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, cv).map_err(|e| AppError::io("failed to write metrics JSON", e))?;
    writer.flush().map_err(|e| AppError::io("failed to flush metrics JSON", e))?;
    Ok(())
}

/// Batch scoring results. Rows that failed validation carry their violations
/// in `error` and leave the prediction columns empty.
pub fn write_scores_csv<W: Write>(out: W, outcomes: &[BatchOutcome]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(["line", "decision", "probability", "confidence", "error"])
        .map_err(|e| AppError::io("failed to write scores header", e))?;

    for o in outcomes {
        let line = o.line.to_string();
        let record = match &o.result {
            Ok(p) => [
                line,
                p.decision.to_string(),
                format!("{:.6}", p.probability),
                p.confidence.to_string(),
                String::new(),
            ],
            Err(e) => [line, String::new(), String::new(), String::new(), e.to_string().replace('\n', " ")],
        };
        writer
            .write_record(&record)
            .map_err(|e| AppError::io("failed to write scores row", e))?;
    }
    writer.flush().map_err(|e| AppError::io("failed to flush scores", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::tests::trained;
    use crate::domain::{ConfidenceTier, PredictionResult};
    use crate::schema::{Problem, ValidationReport, Violation};

    #[test]
    fn batch_scores_carry_predictions_or_violations() {
        let outcomes = vec![
            BatchOutcome {
                line: 2,
                result: Ok(PredictionResult {
                    decision: true,
                    probability: 0.75,
                    confidence: ConfidenceTier::High,
                }),
            },
            BatchOutcome {
                line: 3,
                result: Err(AppError::Validation(ValidationReport {
                    line: Some(3),
                    violations: vec![
                        Violation {
                            field: "Age".into(),
                            problem: Problem::Missing,
                        },
                        Violation {
                            field: "OverTime".into(),
                            problem: Problem::NotText { value: "true".into() },
                        },
                    ],
                })),
            },
        ];

        let mut buf: Vec<u8> = Vec::new();
        write_scores_csv(&mut buf, &outcomes).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, ["line", "decision", "probability", "confidence", "error"]);

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].iter().collect::<Vec<_>>(), ["2", "true", "0.750000", "high", ""]);

        assert_eq!(&rows[1][0], "3");
        assert!(rows[1][1].is_empty() && rows[1][2].is_empty() && rows[1][3].is_empty());
        let error = &rows[1][4];
        assert!(!error.contains('\n'));
        assert!(error.contains("Age") && error.contains("OverTime"), "{error}");
    }

    #[test]
    fn metrics_json_reads_back_as_cv_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let cv = &trained().bundle.cv;

        write_metrics_json(&path, cv).unwrap();
        let back: CvSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(&back, cv);
    }

    #[test]
    fn oof_csv_has_one_column_per_learner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oof.csv");
        let oof = &trained().oof;

        write_oof_csv(&path, oof).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("row,fold,label,p_logistic,p_gbdt,p_tree,p_stacked"));

        let body: Vec<&str> = lines.collect();
        assert_eq!(body.len(), oof.rows.len());
        for line in &body {
            assert_eq!(line.split(',').count(), 7);
        }
    }
}
