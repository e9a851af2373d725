//! Formatted terminal output.
//!
//! Formatting lives here so the training and scoring code only produce data.

use crate::fit::CvSummary;
use crate::io::{ArtifactBundle, RowError};

use super::metrics::ClassificationMetrics;

/// Per-learner table, stacked result, confusion matrix and per-fold lines.
pub fn format_cv_summary(cv: &CvSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Cross-validation: {} folds over {} rows (out-of-fold)\n",
        cv.folds, cv.rows
    ));
    out.push_str(&metrics_header());
    for lm in &cv.learners {
        out.push_str(&metrics_row(lm.learner.display_name(), &lm.metrics));
    }
    out.push_str(&metrics_row("stacked", &cv.stacked));

    let c = &cv.stacked.confusion;
    out.push_str("\nStacked confusion matrix (rows = actual):\n");
    out.push_str(&format!("{:<12} {:>10} {:>10}\n", "", "pred leave", "pred stay"));
    out.push_str(&format!("{:<12} {:>10} {:>10}\n", "leave", c.tp, c.fn_count));
    out.push_str(&format!("{:<12} {:>10} {:>10}\n", "stay", c.fp, c.tn));

    out.push_str(&format!(
        "\n{:<12} {:>9} {:>9} {:>9} {:>9}\n",
        "class", "precision", "recall", "f1", "support"
    ));
    let classes = &cv.stacked.by_class;
    for (name, r) in [("leave", &classes.attrition), ("stay", &classes.retained)] {
        out.push_str(&format!(
            "{:<12} {:>9.3} {:>9.3} {:>9.3} {:>9}\n",
            name, r.precision, r.recall, r.f1, r.support
        ));
    }

    if !cv.per_fold.is_empty() {
        out.push_str("\nPer fold (stacked):\n");
        for f in &cv.per_fold {
            out.push_str(&format!(
                "  fold {:>2}: n={:<5} acc={:.3} f1={:.3} auc={:.3}\n",
                f.fold + 1,
                f.rows,
                f.metrics.accuracy,
                f.metrics.f1,
                f.metrics.roc_auc
            ));
        }
    }

    out
}

/// Human-readable description of a bundle, used by `inspect` and after `train`.
pub fn format_bundle_summary(bundle: &ArtifactBundle) -> String {
    let mut out = String::new();
    let t = &bundle.training;

    out.push_str("=== attrition - stacked attrition model ===\n");
    out.push_str(&format!("Run: {} (format v{})\n", bundle.run_id, bundle.format_version));
    out.push_str(&format!("Created: {}\n", bundle.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
    if !bundle.checksum.is_empty() {
        out.push_str(&format!("Checksum: {}\n", bundle.checksum));
    }

    out.push_str(&format!(
        "Schema: {} fields ({} numeric, {} categorical)\n",
        bundle.schema.fields().len(),
        bundle.schema.numeric_count(),
        bundle.schema.categorical_count()
    ));
    out.push_str(&format!(
        "Training rows: n={} | attrition={} | retained={} | skipped={}\n",
        t.rows, t.attrition, t.retained, t.skipped_rows
    ));
    out.push_str(&format!(
        "Pipeline: encoded={} -> +{} synthetic -> {} components ({:.1}% variance) | seed={}\n",
        t.encoded_width,
        t.synthetic_rows,
        t.components,
        t.retained_variance * 100.0,
        t.seed
    ));

    let learners: Vec<&str> = bundle
        .ensemble
        .learners
        .iter()
        .map(|l| l.kind().display_name())
        .collect();
    out.push_str(&format!("Learners: {} + logistic meta-learner\n", learners.join(", ")));

    let th = &bundle.thresholds;
    out.push_str(&format!(
        "Thresholds: decision>={} | high>{} | medium>{}\n\n",
        th.decision, th.high, th.medium
    ));

    out.push_str(&format_cv_summary(&bundle.cv));
    out
}

/// First `max` skipped rows, plus a count of the rest.
pub fn format_row_errors(errors: &[RowError], max: usize) -> String {
    let mut out = String::new();
    if errors.is_empty() {
        return out;
    }
    out.push_str(&format!("Skipped {} invalid row(s):\n", errors.len()));
    for e in errors.iter().take(max) {
        out.push_str(&format!("  line {}: {}\n", e.line, e.message));
    }
    if errors.len() > max {
        out.push_str(&format!("  ... and {} more\n", errors.len() - max));
    }
    out
}

fn metrics_header() -> String {
    let mut out = format!(
        "{:<10} {:>8} {:>9} {:>8} {:>8} {:>8}\n",
        "learner", "accuracy", "precision", "recall", "f1", "roc_auc"
    );
    out.push_str(&format!(
        "{:-<10} {:-<8} {:-<9} {:-<8} {:-<8} {:-<8}\n",
        "", "", "", "", "", ""
    ));
    out
}

fn metrics_row(name: &str, m: &ClassificationMetrics) -> String {
    format!(
        "{:<10} {:>8.3} {:>9.3} {:>8.3} {:>8.3} {:>8.3}\n",
        name, m.accuracy, m.precision, m.recall, m.f1, m.roc_auc
    )
}
