//! Class-balance correction (training only).

pub mod smote;

pub use smote::*;
