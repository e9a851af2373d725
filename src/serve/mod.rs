//! Online scoring against a frozen artifact bundle.

pub mod context;
pub mod scoring;

pub use context::*;
pub use scoring::*;
