//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module parses arguments, installs logging,
//! and dispatches to the four commands.

use std::io::{self, Write};
use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, InspectArgs, ScoreArgs, SynthArgs, ThresholdArgs, TrainArgs};
use crate::data::{SyntheticConfig, generate_rows};
use crate::domain::{ATTRITION, ConfidenceThresholds, TrainConfig};
use crate::error::AppError;
use crate::io::{
    LabeledDataset, load_training_csv, read_bundle, read_csv_rows, read_record_json, write_bundle,
    write_dataset_csv, write_metrics_json, write_oof_csv, write_scores_csv,
};
use crate::models::{GbdtParams, LearnerParams};
use crate::report::{format_bundle_summary, format_row_errors};
use crate::schema::Schema;
use crate::serve::{ScoringService, ServingContext};

pub mod pipeline;

/// Skipped rows listed in the training summary before truncating.
const MAX_REPORTED_ROW_ERRORS: usize = 10;

/// Entry point for the `attrition` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Score(args) => handle_score(args),
        Command::Synth(args) => handle_synth(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

/// Logs go to stderr so score output on stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let config = train_config_from_args(&args);
    config.validate()?;

    let schema = match &args.schema {
        Some(path) => Schema::from_json_file(path)?,
        None => Schema::canonical(),
    };
    let data = load_dataset(&args, &schema)?;

    let mut run = pipeline::run_training(&schema, &data, &config)?;

    if let Some(path) = &args.export_oof {
        write_oof_csv(path, &run.oof)?;
    }
    if let Some(path) = &args.metrics_json {
        write_metrics_json(path, &run.bundle.cv)?;
    }
    write_bundle(&args.bundle.artifacts, &mut run.bundle)?;

    print!("{}", format_row_errors(&data.row_errors, MAX_REPORTED_ROW_ERRORS));
    println!("{}", format_bundle_summary(&run.bundle));
    println!("Bundle written to {}", args.bundle.artifacts.display());
    Ok(())
}

fn load_dataset(args: &TrainArgs, schema: &Schema) -> Result<LabeledDataset, AppError> {
    match &args.data {
        Some(path) => load_training_csv(path, schema, args.skip_invalid),
        None => {
            tracing::info!(rows = args.synthetic_rows, seed = args.seed, "no --data given, generating a synthetic dataset");
            let rows = generate_rows(&SyntheticConfig {
                rows: args.synthetic_rows,
                seed: args.seed,
            })?;
            pipeline::dataset_from_rows(schema, &rows)
        }
    }
}

fn handle_score(args: ScoreArgs) -> Result<(), AppError> {
    let bundle = read_bundle(&args.bundle.artifacts)?;
    let thresholds = merge_thresholds(bundle.thresholds, &args.thresholds);
    let context = ServingContext::from_bundle(bundle)?.with_thresholds(thresholds)?;
    let service = ScoringService::new(context);

    if let Some(path) = &args.record {
        return score_record(&service, path);
    }
    if let Some(path) = &args.batch {
        return score_batch(&service, path);
    }
    Err(AppError::InvalidConfig("score needs --record or --batch".into()))
}

fn score_record(service: &ScoringService, path: &Path) -> Result<(), AppError> {
    let record = read_record_json(path)?;
    let result = service.score(&record)?;
    let json = serde_json::to_string_pretty(&result).map_err(|e| AppError::io("failed to encode result", e))?;
    println!("{json}");
    Ok(())
}

fn score_batch(service: &ScoringService, path: &Path) -> Result<(), AppError> {
    let (rows, unreadable) = read_csv_rows(path)?;
    for e in &unreadable {
        tracing::warn!(line = e.line, "{}", e.message);
    }

    let outcomes = service.score_batch(&rows);
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    tracing::info!(rows = outcomes.len(), failed, "batch scored");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_scores_csv(&mut out, &outcomes)?;
    out.flush().map_err(|e| AppError::io("failed to flush stdout", e))?;
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let rows = generate_rows(&SyntheticConfig {
        rows: args.rows,
        seed: args.seed,
    })?;
    write_dataset_csv(&args.out, &Schema::canonical(), &rows)?;
    let attrition = rows.iter().filter(|r| r.label == ATTRITION).count();
    println!(
        "Wrote {} rows ({} attrition) to {}",
        rows.len(),
        attrition,
        args.out.display()
    );
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let bundle = read_bundle(&args.bundle.artifacts)?;
    // Building a context runs the cross-artifact checks.
    ServingContext::from_bundle(bundle.clone())?;
    println!("{}", format_bundle_summary(&bundle));
    Ok(())
}

pub fn train_config_from_args(args: &TrainArgs) -> TrainConfig {
    let defaults = TrainConfig::default();
    TrainConfig {
        folds: args.folds,
        neighbours: args.neighbours,
        components: args.components,
        seed: args.seed,
        learners: args.learners.clone(),
        params: LearnerParams {
            gbdt: GbdtParams {
                rounds: args.gbdt_rounds,
                ..GbdtParams::default()
            },
            ..LearnerParams::default()
        },
        thresholds: merge_thresholds(defaults.thresholds, &args.thresholds),
    }
}

fn merge_thresholds(base: ConfidenceThresholds, args: &ThresholdArgs) -> ConfidenceThresholds {
    ConfidenceThresholds {
        decision: args.decision.unwrap_or(base.decision),
        high: args.high.unwrap_or(base.high),
        medium: args.medium.unwrap_or(base.medium),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train_args(extra: &[&str]) -> TrainArgs {
        let argv = ["attrition", "train"].iter().chain(extra.iter()).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Train(args) => args,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn flags_become_a_plain_train_config() {
        let config = train_config_from_args(&train_args(&["--folds", "4", "--gbdt-rounds", "7", "--high", "0.9"]));
        assert_eq!(config.folds, 4);
        assert_eq!(config.params.gbdt.rounds, 7);
        assert_eq!(config.thresholds.high, 0.9);
        assert_eq!(config.thresholds.medium, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_threshold_flags_fail_validation() {
        let config = train_config_from_args(&train_args(&["--high", "0.2"]));
        assert!(matches!(config.validate(), Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn synthetic_dataset_is_used_without_data_flag() {
        let args = train_args(&["--synthetic-rows", "50", "--seed", "3"]);
        let data = load_dataset(&args, &Schema::canonical()).unwrap();
        assert_eq!(data.records.len(), 50);
        assert_eq!(data.stats.rows, 50);
    }
}
