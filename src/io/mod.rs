//! Input/output helpers.
//!
//! - CSV / JSON ingest + validation (`ingest`)
//! - artifact bundle read/write (`artifact`)
//! - dataset, OOF, metrics and score exports (`export`)

pub mod artifact;
pub mod export;
pub mod ingest;

pub use artifact::*;
pub use export::*;
pub use ingest::*;
