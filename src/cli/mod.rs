//! Command-line parsing for the `attrition` binary.
//!
//! Argument parsing and command dispatch stay separate from the modelling code:
//! `app` converts these types into a plain `TrainConfig` before the pipeline
//! sees them.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::BaseLearnerKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "attrition", version, about = "Stacked-ensemble employee attrition scorer")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train the full pipeline and write an artifact bundle.
    Train(TrainArgs),
    /// Score one JSON record or a CSV batch against a bundle.
    Score(ScoreArgs),
    /// Write a seeded synthetic HR dataset as CSV.
    Synth(SynthArgs),
    /// Print what a bundle contains.
    Inspect(InspectArgs),
}

#[derive(Debug, Args, Clone)]
pub struct BundlePath {
    /// Artifact bundle location.
    #[arg(long, env = "ATTRITION_ARTIFACTS", default_value = "bundle.json", value_name = "JSON")]
    pub artifacts: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    /// Labeled training CSV. Without it a synthetic dataset is generated.
    #[arg(long, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Rows to generate when `--data` is not given.
    #[arg(long, default_value_t = 1470)]
    pub synthetic_rows: usize,

    /// JSON field table replacing the built-in schema.
    #[arg(long, value_name = "JSON")]
    pub schema: Option<PathBuf>,

    /// Skip invalid CSV rows instead of aborting.
    #[arg(long)]
    pub skip_invalid: bool,

    #[command(flatten)]
    pub bundle: BundlePath,

    /// Stratified folds for out-of-fold stacking.
    #[arg(long, default_value_t = 10)]
    pub folds: usize,

    /// Nearest neighbours used when synthesizing minority rows.
    #[arg(long, default_value_t = 5)]
    pub neighbours: usize,

    /// Principal components retained.
    #[arg(long, default_value_t = 23)]
    pub components: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Base learners to stack, comma separated.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = BaseLearnerKind::DEFAULT_SET)]
    pub learners: Vec<BaseLearnerKind>,

    /// Boosting rounds for the gbdt learner.
    #[arg(long, default_value_t = 100)]
    pub gbdt_rounds: usize,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Write out-of-fold predictions to CSV.
    #[arg(long = "export-oof", value_name = "CSV")]
    pub export_oof: Option<PathBuf>,

    /// Write cross-validation metrics to JSON.
    #[arg(long = "metrics-json", value_name = "JSON")]
    pub metrics_json: Option<PathBuf>,
}

/// Probability cut-offs. Unset values fall back to the defaults at training
/// time and to the bundle's values at scoring time.
#[derive(Debug, Args, Clone, Default)]
pub struct ThresholdArgs {
    /// Decision threshold (p >= decision predicts attrition).
    #[arg(long)]
    pub decision: Option<f64>,

    /// High-confidence tier cut-off (strict >).
    #[arg(long)]
    pub high: Option<f64>,

    /// Medium-confidence tier cut-off (strict >).
    #[arg(long)]
    pub medium: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub bundle: BundlePath,

    /// One JSON object to score.
    #[arg(long, value_name = "JSON", conflicts_with = "batch", required_unless_present = "batch")]
    pub record: Option<PathBuf>,

    /// CSV of records to score; results go to stdout as CSV.
    #[arg(long, value_name = "CSV")]
    pub batch: Option<PathBuf>,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    #[arg(long, default_value_t = 1470)]
    pub rows: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub bundle: BundlePath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_defaults_match_the_reference_configuration() {
        let cli = Cli::try_parse_from(["attrition", "train", "--artifacts", "out.json"]).unwrap();
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!((args.folds, args.neighbours, args.components, args.seed), (10, 5, 23, 42));
        assert_eq!(args.learners, BaseLearnerKind::DEFAULT_SET.to_vec());
        assert_eq!(args.bundle.artifacts, PathBuf::from("out.json"));
        assert!(args.thresholds.high.is_none());
    }

    #[test]
    fn learners_are_comma_separated() {
        let cli = Cli::try_parse_from(["attrition", "-v", "train", "--learners", "tree,logistic"]).unwrap();
        assert!(cli.verbose);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.learners, vec![BaseLearnerKind::Tree, BaseLearnerKind::Logistic]);
    }

    #[test]
    fn score_needs_exactly_one_input() {
        assert!(Cli::try_parse_from(["attrition", "score"]).is_err());
        assert!(Cli::try_parse_from(["attrition", "score", "--record", "a.json", "--batch", "b.csv"]).is_err());
        assert!(Cli::try_parse_from(["attrition", "score", "--batch", "b.csv", "--high", "0.8"]).is_ok());
    }

    #[test]
    fn unknown_learner_is_rejected() {
        assert!(Cli::try_parse_from(["attrition", "train", "--learners", "forest"]).is_err());
    }
}
