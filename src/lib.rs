//! `attrition-stack` library crate.
//!
//! The binary (`attrition`) is a thin wrapper around this library so the whole
//! train-and-score pipeline is testable without spawning processes.
//!
//! Training: validate -> encode -> oversample -> reduce -> stacked ensemble.
//! Serving replays validate -> encode -> reduce -> ensemble against the frozen
//! artifacts of one training run.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod reduce;
pub mod report;
pub mod resample;
pub mod schema;
pub mod serve;
