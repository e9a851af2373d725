//! Record scoring.
//!
//! `score` is a pure function of the record and the context: validate, encode,
//! project, run the ensemble, then map the probability to a decision and a
//! confidence tier. The context is only read, so any number of scoring calls
//! can share it.

use rayon::prelude::*;

use crate::domain::{PredictionResult, RawRecord};
use crate::error::AppError;
use crate::io::CsvRow;

use super::context::ServingContext;

/// Result for one row of a batch, tagged with its source line.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub line: usize,
    pub result: Result<PredictionResult, AppError>,
}

pub struct ScoringService {
    context: ServingContext,
}

impl ScoringService {
    pub fn new(context: ServingContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ServingContext {
        &self.context
    }

    /// Ensemble probability for one raw record.
    pub fn probability(&self, record: &RawRecord) -> Result<f64, AppError> {
        let ctx = &self.context;
        let validated = ctx.schema().validate(record).map_err(AppError::Validation)?;
        let encoded = ctx.features().transform(&validated)?;
        let reduced = ctx.reducer().transform(&encoded)?;
        let p = ctx.ensemble().predict_proba(&reduced);
        if !p.is_finite() {
            return Err(AppError::Numerical("ensemble produced a non-finite probability".into()));
        }
        Ok(p.clamp(0.0, 1.0))
    }

    pub fn score(&self, record: &RawRecord) -> Result<PredictionResult, AppError> {
        let probability = self.probability(record)?;
        let thresholds = self.context.thresholds();
        let result = PredictionResult {
            decision: thresholds.decide(probability),
            probability,
            confidence: thresholds.tier(probability),
        };
        tracing::debug!(
            probability = result.probability,
            decision = result.decision,
            confidence = %result.confidence,
            "scored record"
        );
        Ok(result)
    }

    /// Score rows in parallel; output order matches input order.
    pub fn score_batch(&self, rows: &[CsvRow]) -> Vec<BatchOutcome> {
        rows.par_iter()
            .map(|row| BatchOutcome {
                line: row.line,
                result: self.score(&row.record),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::tests::trained;
    use crate::data::{SyntheticConfig, generate_rows, reference_record};
    use crate::domain::{ConfidenceThresholds, ConfidenceTier, RawValue};

    fn service() -> ScoringService {
        ScoringService::new(ServingContext::from_bundle(trained().bundle.clone()).unwrap())
    }

    #[test]
    fn reference_record_scores_end_to_end() {
        let svc = service();
        let mut rec = reference_record();
        rec.insert("Age".into(), RawValue::Int(30));
        rec.insert("MonthlyIncome".into(), RawValue::Int(5000));
        rec.insert("BusinessTravel".into(), RawValue::from("Travel_Rarely"));
        rec.insert("OverTime".into(), RawValue::from("Yes"));

        let result = svc.score(&rec).unwrap();
        assert!((0.0..=1.0).contains(&result.probability));
        assert_eq!(result.decision, result.probability >= 0.5);
        assert_eq!(result.confidence, ConfidenceThresholds::default().tier(result.probability));
    }

    #[test]
    fn scoring_is_deterministic() {
        let svc = service();
        let rec = reference_record();
        let a = svc.score(&rec).unwrap();
        let b = svc.score(&rec.clone()).unwrap();
        assert_eq!(a.probability.to_bits(), b.probability.to_bits());
    }

    #[test]
    fn invalid_record_returns_every_violation() {
        let svc = service();
        let mut rec = reference_record();
        rec.remove("Age");
        rec.insert("OverTime".into(), RawValue::from("Sometimes"));

        match svc.score(&rec) {
            Err(AppError::Validation(report)) => {
                assert_eq!(report.len(), 2);
                assert!(report.mentions("Age") && report.mentions("OverTime"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn json_null_and_bool_are_field_violations() {
        let svc = service();
        let mut body = serde_json::to_value(reference_record()).unwrap();
        let fields = body.as_object_mut().unwrap();
        fields.insert("Age".into(), serde_json::Value::Null);
        fields.insert("OverTime".into(), serde_json::Value::Bool(true));
        fields.remove("Gender");
        let rec: RawRecord = serde_json::from_value(body).unwrap();

        match svc.score(&rec) {
            Err(AppError::Validation(report)) => {
                assert_eq!(report.len(), 3);
                assert!(report.mentions("Age") && report.mentions("OverTime") && report.mentions("Gender"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn validation_failures_are_recoverable() {
        let svc = service();
        let mut rec = reference_record();
        rec.insert("Age".into(), RawValue::Int(7));
        let err = svc.score(&rec).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn threshold_overrides_change_tiers_not_probabilities() {
        let base = service();
        let rec = reference_record();
        let p = base.score(&rec).unwrap().probability;

        let strict = ConfidenceThresholds {
            decision: 1.0,
            high: 1.0,
            medium: 0.99,
        };
        let svc = ScoringService::new(
            ServingContext::from_bundle(trained().bundle.clone())
                .unwrap()
                .with_thresholds(strict)
                .unwrap(),
        );
        let r = svc.score(&rec).unwrap();
        assert_eq!(r.probability, p);
        if p < 1.0 {
            assert!(!r.decision);
        }
        if p <= 0.99 {
            assert_eq!(r.confidence, ConfidenceTier::Low);
        }
    }

    #[test]
    fn batch_scoring_keeps_row_order() {
        let svc = service();
        let rows: Vec<CsvRow> = generate_rows(&SyntheticConfig { rows: 40, seed: 8 })
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, r)| CsvRow {
                line: i + 2,
                record: r.record,
            })
            .collect();

        let outcomes = svc.score_batch(&rows);
        assert_eq!(outcomes.len(), 40);
        for (o, row) in outcomes.iter().zip(rows.iter()) {
            assert_eq!(o.line, row.line);
            let single = svc.score(&row.record).unwrap();
            assert_eq!(o.result.as_ref().unwrap().probability, single.probability);
        }
    }
}
