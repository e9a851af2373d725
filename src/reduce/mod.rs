//! Dimensionality reduction of encoded vectors.

pub mod pca;

pub use pca::*;
