//! Reporting: classification metrics and formatted terminal output.

pub mod format;
pub mod metrics;

pub use format::*;
pub use metrics::*;
