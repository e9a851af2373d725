//! Cross-validated stacking.
//!
//! - stratified fold assignment
//! - out-of-fold prediction (folds fitted in parallel)
//! - the stacked ensemble and its production refit

pub mod folds;
pub mod stacking;

pub use folds::*;
pub use stacking::*;
